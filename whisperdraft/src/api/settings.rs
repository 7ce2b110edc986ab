use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use shared_types::SettingsPatch;

use crate::api::{api_error, ApiErrorCode, ApiState};

/// Current settings with the API key reduced to `hasApiKey`.
pub async fn get_settings(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.app_state.settings().get().view())
}

pub async fn update_settings(
    State(state): State<ApiState>,
    Json(patch): Json<SettingsPatch>,
) -> impl IntoResponse {
    match state.app_state.update_settings(patch).await {
        Ok(update) => (StatusCode::OK, Json(update.settings.view())).into_response(),
        Err(e) => api_error(ApiErrorCode::InvalidSettings, e.to_string()),
    }
}

pub async fn autosave_status(State(state): State<ApiState>) -> impl IntoResponse {
    match state.app_state.autosave_status().await {
        Some(status) => Json(json!({ "running": true, "status": status })),
        None => Json(json!({ "running": false })),
    }
}
