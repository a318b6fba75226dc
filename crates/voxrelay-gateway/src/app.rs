use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;

use voxrelay_cache::DedupCache;
use voxrelay_core::VoxRelayConfig;
use voxrelay_session::{ConversationLog, SessionCoordinator};
use voxrelay_upstream::UpstreamClient;

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: VoxRelayConfig,
    pub upstream: UpstreamClient,
    pub coordinator: SessionCoordinator,
    pub dedup: DedupCache,
    pub conversations: ConversationLog,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: VoxRelayConfig) -> Self {
        let dedup = DedupCache::new(
            std::time::Duration::from_millis(config.tuning.dedup_window_ms),
            std::time::Duration::from_millis(config.tuning.dedup_window_ms * 2),
        );
        let conversations = ConversationLog::new(config.tuning.max_conversations);
        let upstream = UpstreamClient::new(config.upstream.clone());

        Self {
            config,
            upstream,
            coordinator: SessionCoordinator::new(),
            dedup,
            conversations,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/v1/chat/completions",
            post(crate::http::chat::chat_completions),
        )
        .route(
            "/v1/chat/completions/chat/completions",
            post(crate::http::chat::chat_completions),
        )
        .route(
            "/conversations",
            get(crate::http::conversations::list_conversations)
                .delete(crate::http::conversations::clear_conversations),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
