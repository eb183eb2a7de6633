use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json as ResponseJson;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub asr_pool: bool,
    pub tts_pool: bool,
    pub session_cache: bool,
}

/// `GET /ready` (spec.md §6): 200 when provider pools and the session cache
/// are reachable, 503 otherwise.
pub async fn ready_check(State(state): State<AppState>) -> (StatusCode, ResponseJson<ReadyResponse>) {
    let asr_pool = state.asr_pool.is_initialized();
    let tts_pool = state.tts_pool.is_initialized();
    let session_cache = state.sessions.ping().await;

    let ready = asr_pool && tts_pool && session_cache;
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        ResponseJson(ReadyResponse {
            status: if ready { "ready" } else { "not_ready" },
            asr_pool,
            tts_pool,
            session_cache,
        }),
    )
}
