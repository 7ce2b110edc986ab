//! Completion endpoints backed by the server-held key.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use shared_types::{GenerateRequest, HealthResponse, SummaryRequest, TextResponse};

use crate::api::{api_error, completion_error, ApiErrorCode, ApiState};
use crate::completion::CompletionOptions;

const PROVIDER: &str = "openai";

fn server_time() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Generate text with the server's key. Callers cannot supply their own.
pub async fn generate(
    State(state): State<ApiState>,
    Json(req): Json<GenerateRequest>,
) -> impl IntoResponse {
    if req.prompt.trim().is_empty() {
        return api_error(ApiErrorCode::InvalidRequest, "Prompt is required");
    }

    let settings = state.app_state.settings().get();
    let options = CompletionOptions {
        api_key: None,
        model: req.model.unwrap_or(settings.ai_model),
        max_tokens: req.max_tokens.unwrap_or(settings.max_tokens),
        temperature: req.temperature.unwrap_or(settings.temperature),
    };
    let system_prompt = req.system_prompt.unwrap_or(settings.system_prompt);

    match state
        .app_state
        .client()
        .generate_response(&req.prompt, &system_prompt, &options)
        .await
    {
        Ok(text) => (StatusCode::OK, Json(TextResponse { text })).into_response(),
        Err(e) => completion_error(&e),
    }
}

pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let client = state.app_state.client();
    if !client.has_shared_key() {
        return (
            StatusCode::NOT_FOUND,
            Json(HealthResponse {
                available: false,
                provider: None,
                error: Some("OpenAI API key is not configured on the server".to_string()),
                server_time: server_time(),
            }),
        );
    }

    let available = client.check_availability(None).await;
    (
        StatusCode::OK,
        Json(HealthResponse {
            available,
            provider: Some(PROVIDER.to_string()),
            error: None,
            server_time: server_time(),
        }),
    )
}

/// Whether the server holds a key; no provider call.
pub async fn provider_info(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        available: state.app_state.client().has_shared_key(),
        provider: Some(PROVIDER.to_string()),
        error: None,
        server_time: server_time(),
    })
}

pub async fn summarize(
    State(state): State<ApiState>,
    Json(req): Json<SummaryRequest>,
) -> impl IntoResponse {
    let options = CompletionOptions::from_settings(&state.app_state.settings().get());
    let text = state
        .app_state
        .client()
        .generate_summary(&req.content, &options)
        .await;
    Json(TextResponse { text })
}
