use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json as ResponseJson};
use serde::Serialize;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub language: String,
    pub state: domain::SessionState,
    pub history_len: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

/// `GET /sessions/{id}` (spec.md §6): session snapshot or 404.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.sessions.get(id).await {
        Some(session) => (
            StatusCode::OK,
            ResponseJson(Some(SessionSnapshot {
                session_id: session.id,
                language: session.language,
                state: session.state,
                history_len: session.history.len(),
                created_at: session.created_at,
                last_activity: session.last_activity,
            })),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, ResponseJson(None::<SessionSnapshot>)).into_response(),
    }
}
