//! GET/DELETE /conversations — the bounded debug log.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

pub async fn list_conversations(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "conversations": state.conversations.list() }))
}

pub async fn clear_conversations(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cleared = state.conversations.list().len();
    for entry in state.conversations.list() {
        state.conversations.delete(&entry.session);
    }
    Json(json!({ "cleared": cleared }))
}
