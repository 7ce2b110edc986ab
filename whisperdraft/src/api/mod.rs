//! HTTP API routes for Whisperdraft
//!
//! Thin handlers over [`AppState`]: the note, the chat log, settings and the
//! server-held completion key.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use shared_types::{ErrorResponse, PersistResponse};

pub mod ai;
pub mod chat;
pub mod note;
pub mod settings;

use crate::app_state::AppState;
use crate::completion::CompletionError;

#[derive(Clone)]
pub struct ApiState {
    pub app_state: AppState,
}

/// Machine-readable error codes returned in `{error, code}` bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    InvalidRequest,
    InvalidSettings,
    SaveInProgress,
    NotConfigured,
    MissingApiKey,
    ApiError,
    NetworkError,
    ServerActionError,
    MockError,
    UnexpectedError,
}

impl ApiErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiErrorCode::InvalidRequest => "invalid_request",
            ApiErrorCode::InvalidSettings => "invalid_settings",
            ApiErrorCode::SaveInProgress => "save_in_progress",
            ApiErrorCode::NotConfigured => "not_configured",
            ApiErrorCode::MissingApiKey => "missing_api_key",
            ApiErrorCode::ApiError => "api_error",
            ApiErrorCode::NetworkError => "network_error",
            ApiErrorCode::ServerActionError => "server_action_error",
            ApiErrorCode::MockError => "mock_error",
            ApiErrorCode::UnexpectedError => "unexpected_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::InvalidSettings => StatusCode::BAD_REQUEST,
            ApiErrorCode::SaveInProgress => StatusCode::CONFLICT,
            ApiErrorCode::NotConfigured => StatusCode::NOT_FOUND,
            ApiErrorCode::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::ApiError => StatusCode::BAD_GATEWAY,
            ApiErrorCode::NetworkError => StatusCode::BAD_GATEWAY,
            ApiErrorCode::ServerActionError => StatusCode::BAD_GATEWAY,
            ApiErrorCode::MockError => StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorCode::UnexpectedError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&CompletionError> for ApiErrorCode {
    fn from(value: &CompletionError) -> Self {
        match value {
            CompletionError::MissingApiKey => ApiErrorCode::MissingApiKey,
            CompletionError::Api { .. } => ApiErrorCode::ApiError,
            CompletionError::Network(_) => ApiErrorCode::NetworkError,
            CompletionError::ServerAction(_) => ApiErrorCode::ServerActionError,
            CompletionError::Mock(_) => ApiErrorCode::MockError,
            CompletionError::Unexpected(_) => ApiErrorCode::UnexpectedError,
        }
    }
}

pub fn api_error(code: ApiErrorCode, message: impl Into<String>) -> Response {
    (
        code.status_code(),
        Json(ErrorResponse {
            error: message.into(),
            code: code.as_str().to_string(),
            upstream_status: None,
            upstream_code: None,
        }),
    )
        .into_response()
}

/// Error body for a failed completion, carrying the provider's status and
/// code when it rejected the request.
pub fn completion_error(error: &CompletionError) -> Response {
    let code = ApiErrorCode::from(error);
    (
        code.status_code(),
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.as_str().to_string(),
            upstream_status: error.upstream_status(),
            upstream_code: error.upstream_code().map(str::to_string),
        }),
    )
        .into_response()
}

/// Configure all API routes
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health_check))
        // Completion routes
        .route("/api/ai", get(ai::provider_info))
        .route("/api/ai/generate", post(ai::generate))
        .route("/api/ai/health", get(ai::health))
        .route("/api/summary", post(ai::summarize))
        // Note routes
        .route("/note", get(note::get_note).put(note::set_content))
        .route("/note/save", post(note::save_note))
        // Chat routes
        .route("/chat", get(chat::get_chat))
        .route(
            "/chat/messages",
            post(chat::add_message).delete(chat::clear_messages),
        )
        // Settings routes
        .route(
            "/settings",
            get(settings::get_settings).patch(settings::update_settings),
        )
        .route("/autosave", get(settings::autosave_status))
        .route("/reset", post(reset))
}

/// Health check endpoint
pub async fn health_check(State(_state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "whisperdraft",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Clear persistence and return every store to its initial state.
pub async fn reset(State(state): State<ApiState>) -> impl IntoResponse {
    let persisted = state.app_state.reset().await;
    (StatusCode::OK, Json(PersistResponse { persisted }))
}
