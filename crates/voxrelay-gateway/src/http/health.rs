use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "uptimeSeconds": state.uptime_seconds(),
        "activeSessions": state.coordinator.active_sessions(),
        "loggedConversations": state.conversations.len(),
        "phraseCategories": voxrelay_catalog::categories().len(),
    }))
}
