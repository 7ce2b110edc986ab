use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use shared_types::{ContentRequest, PersistResponse};

use crate::api::{api_error, ApiErrorCode, ApiState};

pub async fn get_chat(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.app_state.conversation().snapshot())
}

pub async fn add_message(
    State(state): State<ApiState>,
    Json(req): Json<ContentRequest>,
) -> impl IntoResponse {
    if req.content.trim().is_empty() {
        return api_error(ApiErrorCode::InvalidRequest, "Message content is required");
    }
    let message = state.app_state.conversation().add_user_message(req.content);
    (StatusCode::CREATED, Json(message)).into_response()
}

pub async fn clear_messages(State(state): State<ApiState>) -> impl IntoResponse {
    let persisted = state.app_state.conversation().clear_messages();
    Json(PersistResponse { persisted })
}
