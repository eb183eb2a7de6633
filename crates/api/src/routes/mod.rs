pub mod health;
pub mod metrics;
pub mod ready;
pub mod sessions;
pub mod voice;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Assemble the full router: the `/ws/voice` stream endpoint plus the admin
/// HTTP surface (spec.md §6).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/voice", get(voice::voice_handler))
        .route("/health", get(health::health_check))
        .route("/ready", get(ready::ready_check))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/sessions/{id}", get(sessions::get_session))
        .with_state(state)
}
