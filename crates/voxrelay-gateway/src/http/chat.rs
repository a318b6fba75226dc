//! POST /v1/chat/completions — the voice platform's streaming endpoint.
//! Both the canonical path and its duplicated variant
//! (`/v1/chat/completions/chat/completions`, a known routing quirk of the
//! voice platform) are wired to this same handler in `app::build_router`.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::sse::{KeepAlive, Sse},
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use crate::app::AppState;
use crate::pipeline::run_turn;

/// Headers the voice platform expects beyond what `axum::response::sse::Sse`
/// sets on its own (it already sets `content-type: text/event-stream`).
fn sse_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("cache-control", HeaderValue::from_static("no-cache"));
    headers.insert("connection", HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    headers
}

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> impl axum::response::IntoResponse {
    let stream = run_turn(state, body);
    (sse_headers(), Sse::new(stream).keep_alive(KeepAlive::default()))
}
