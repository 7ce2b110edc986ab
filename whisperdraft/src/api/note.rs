use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use shared_types::{ContentRequest, PersistResponse, SaveResponse};

use crate::api::{api_error, ApiErrorCode, ApiState};
use crate::note::NoteError;

pub async fn get_note(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.app_state.note().snapshot())
}

/// Replace the live text. Storage failures do not block the edit.
pub async fn set_content(
    State(state): State<ApiState>,
    Json(req): Json<ContentRequest>,
) -> impl IntoResponse {
    let persisted = state.app_state.note().set_content(req.content);
    Json(PersistResponse { persisted })
}

/// Manual save. The response cycle for a new diff continues in the
/// background; poll `/chat` for the reply.
pub async fn save_note(State(state): State<ApiState>) -> impl IntoResponse {
    match state.app_state.save_and_respond() {
        Ok(saved) => (
            StatusCode::OK,
            Json(SaveResponse {
                diff: saved.outcome.diff,
                summary: saved.summary,
                persisted: saved.outcome.persisted,
            }),
        )
            .into_response(),
        Err(e @ NoteError::SaveInProgress) => {
            api_error(ApiErrorCode::SaveInProgress, e.to_string())
        }
    }
}
