//! Hosted text-completion access.
//!
//! `CompletionClient` is the entry point. It resolves which credential to
//! use, then talks to the provider through a [`CompletionTransport`]:
//! `OpenAiTransport` over HTTP in production, `MockTransport` in tests and
//! offline runs.

mod client;
mod credential;
mod mock;
mod openai;

pub use client::{Completion, CompletionClient, CompletionOptions};
pub use credential::Credential;
pub use mock::{MockReply, MockTransport};
pub use openai::{parse_stream_line, OpenAiTransport, SseLineBuffer, StreamLine, DEFAULT_BASE_URL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompletionError {
    #[error("OpenAI API key is required. Please add it in the settings.")]
    MissingApiKey,
    #[error("provider rejected the request ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("failed to reach the completion provider: {0}")]
    Network(String),
    #[error("mock completion failure: {0}")]
    Mock(String),
    #[error("shared-key completion request failed: {0}")]
    ServerAction(String),
    #[error("unexpected completion error: {0}")]
    Unexpected(String),
}

impl CompletionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "missing_api_key",
            Self::Api { .. } => "api_error",
            Self::Network(_) => "network_error",
            Self::Mock(_) => "mock_error",
            Self::ServerAction(_) => "server_action_error",
            Self::Unexpected(_) => "unexpected_error",
        }
    }

    /// Status reported by the provider, for `api_error`.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Provider error code, for `api_error`.
    pub fn upstream_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.upstream_status() == Some(429)
            || matches!(
                self.upstream_code(),
                Some("rate_limit_exceeded") | Some("insufficient_quota")
            )
    }

    pub fn is_context_length_exceeded(&self) -> bool {
        self.upstream_code() == Some("context_length_exceeded")
    }
}

// ============================================================================
// Provider wire format
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl ChatCompletionRequest {
    pub fn new(prompt: &str, system_prompt: &str, options: &CompletionOptions) -> Self {
        Self {
            model: options.model.clone(),
            messages: vec![
                WireMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                WireMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream: false,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn user_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub model: String,
}

impl ChatCompletionResponse {
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn code_string(&self) -> Option<String> {
        match self.code.as_ref()? {
            serde_json::Value::String(code) => Some(code.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Provider-facing side of the client.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn chat_completion(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, CompletionError>;

    /// Deliver the response piecewise to `on_chunk`.
    async fn stream_chat_completion(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<(), CompletionError>;

    /// Authenticated liveness probe (models listing).
    async fn list_models(&self, api_key: &str) -> Result<(), CompletionError>;
}
