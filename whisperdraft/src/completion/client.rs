use shared_types::{Settings, DEFAULT_AI_MODEL, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use std::sync::Arc;

use super::{
    ChatCompletionRequest, CompletionError, CompletionTransport, Credential, Usage,
};
use crate::error_log;
use crate::retry::{retry_with_backoff, RetryPolicy};

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that summarizes text concisely and accurately.";
const SUMMARY_FALLBACK: &str = "Unable to generate summary";

/// Per-request generation knobs.
#[derive(Clone, PartialEq)]
pub struct CompletionOptions {
    /// User-supplied key; the server key is used when absent.
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_AI_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl CompletionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_key: settings.user_api_key().map(str::to_string),
            model: settings.ai_model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }
}

impl std::fmt::Debug for CompletionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionOptions")
            .field("has_api_key", &self.api_key.is_some())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
    pub model: String,
}

/// Completion access with credential resolution.
#[derive(Clone)]
pub struct CompletionClient {
    transport: Arc<dyn CompletionTransport>,
    shared_key: Option<String>,
}

impl CompletionClient {
    pub fn new(transport: Arc<dyn CompletionTransport>, shared_key: Option<String>) -> Self {
        Self {
            transport,
            shared_key: shared_key.filter(|key| !key.trim().is_empty()),
        }
    }

    pub fn has_shared_key(&self) -> bool {
        self.shared_key.is_some()
    }

    pub fn credential(&self, user_key: Option<&str>) -> Credential {
        Credential::resolve(user_key, self.shared_key.as_deref())
    }

    /// Whether a request with `user_key` would have any key to send.
    pub fn has_credential(&self, user_key: Option<&str>) -> bool {
        !self.credential(user_key).is_missing()
    }

    pub async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, CompletionError> {
        let credential = self.credential(options.api_key.as_deref());
        let request = ChatCompletionRequest::new(prompt, system_prompt, options);

        let result = match &credential {
            Credential::Missing => Err(CompletionError::MissingApiKey),
            Credential::User(key) => self.transport.chat_completion(key, &request).await,
            Credential::Shared(key) => self
                .transport
                .chat_completion(key, &request)
                .await
                .map_err(shared_path_error),
        };

        match result {
            Ok(response) => {
                tracing::debug!(
                    credential = credential.source(),
                    model = %response.model,
                    "Completion received"
                );
                Ok(Completion {
                    text: response.text().unwrap_or_default().to_string(),
                    usage: response.usage,
                    model: response.model,
                })
            }
            Err(e) => {
                error_log::log_completion_error(
                    "Completion request failed",
                    "generate",
                    &e,
                    Some(serde_json::json!({
                        "credential": credential.source(),
                        "code": e.code(),
                        "status": e.upstream_status(),
                    })),
                );
                Err(e)
            }
        }
    }

    pub async fn generate_response(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        self.generate(prompt, system_prompt, options)
            .await
            .map(|completion| completion.text)
    }

    pub async fn stream_response(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &CompletionOptions,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<(), CompletionError> {
        let credential = self.credential(options.api_key.as_deref());
        let request = ChatCompletionRequest::new(prompt, system_prompt, options);

        let result = match &credential {
            Credential::Missing => Err(CompletionError::MissingApiKey),
            Credential::User(key) => {
                self.transport
                    .stream_chat_completion(key, &request, on_chunk)
                    .await
            }
            Credential::Shared(key) => self
                .transport
                .stream_chat_completion(key, &request, on_chunk)
                .await
                .map_err(shared_path_error),
        };

        if let Err(e) = &result {
            error_log::log_completion_error(
                "Streaming completion failed",
                "stream",
                e,
                Some(serde_json::json!({ "credential": credential.source() })),
            );
        }
        result
    }

    /// Probe the provider. Never fails; problems read as "unavailable".
    pub async fn check_availability(&self, user_key: Option<&str>) -> bool {
        let credential = self.credential(user_key);
        let key = match &credential {
            Credential::User(key) | Credential::Shared(key) => key,
            Credential::Missing => {
                tracing::info!("No API key configured, completion service unavailable");
                return false;
            }
        };

        match self.transport.list_models(key).await {
            Ok(()) => true,
            Err(e) => {
                error_log::log_network_error(
                    "Completion service availability check failed",
                    "check_availability",
                    &e,
                );
                false
            }
        }
    }

    /// Availability probe retried under `policy` before giving up.
    pub async fn check_availability_with_retry(
        &self,
        user_key: Option<&str>,
        policy: RetryPolicy,
    ) -> bool {
        let Some(key) = (match self.credential(user_key) {
            Credential::User(key) | Credential::Shared(key) => Some(key),
            Credential::Missing => None,
        }) else {
            return false;
        };

        let transport = self.transport.clone();
        let probe = retry_with_backoff(policy, || {
            let transport = transport.clone();
            let key = key.clone();
            async move { transport.list_models(&key).await }
        })
        .await;

        match probe {
            Ok(()) => true,
            Err(e) => {
                error_log::log_network_error(
                    "Completion service unavailable after retries",
                    "check_availability",
                    &e,
                );
                false
            }
        }
    }

    /// Two-to-three sentence summary of `content`. Empty input yields an
    /// empty summary; failures yield a fixed placeholder.
    pub async fn generate_summary(&self, content: &str, options: &CompletionOptions) -> String {
        if content.trim().is_empty() {
            return String::new();
        }

        let prompt = format!("Summarize the following text in 2-3 sentences:\n\n{content}");
        match self
            .generate_response(&prompt, SUMMARY_SYSTEM_PROMPT, options)
            .await
        {
            Ok(text) => text,
            Err(_) => SUMMARY_FALLBACK.to_string(),
        }
    }
}

/// Shared-key calls report transport trouble as a server-side failure.
fn shared_path_error(error: CompletionError) -> CompletionError {
    match error {
        CompletionError::Api { .. } | CompletionError::ServerAction(_) => error,
        other => CompletionError::ServerAction(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{MockReply, MockTransport};
    use std::time::Duration;

    fn client(mock: &Arc<MockTransport>, shared: Option<&str>) -> CompletionClient {
        CompletionClient::new(mock.clone(), shared.map(str::to_string))
    }

    fn user_options(key: &str) -> CompletionOptions {
        CompletionOptions {
            api_key: Some(key.to_string()),
            ..CompletionOptions::default()
        }
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network_call() {
        let mock = Arc::new(MockTransport::new());
        let client = client(&mock, None);

        let err = client
            .generate_response("hi", "sys", &CompletionOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, CompletionError::MissingApiKey);
        assert_eq!(mock.calls(), 0);
        assert!(!client.has_credential(None));
    }

    #[tokio::test]
    async fn test_user_key_is_sent_instead_of_shared_key() {
        let mock = Arc::new(MockTransport::new());
        mock.push_reply(MockReply::text("ok"));
        let client = client(&mock, Some("sk-server"));

        let text = client
            .generate_response("hi", "sys", &user_options("sk-user"))
            .await
            .unwrap();

        assert_eq!(text, "ok");
        assert_eq!(mock.keys_used(), vec!["sk-user"]);
    }

    #[tokio::test]
    async fn test_request_carries_system_and_user_prompts() {
        let mock = Arc::new(MockTransport::new());
        let client = client(&mock, Some("sk-server"));

        client
            .generate_response("the prompt", "the system", &CompletionOptions::default())
            .await
            .unwrap();

        let request = mock.last_request().unwrap();
        assert_eq!(request.system_prompt(), Some("the system"));
        assert_eq!(request.user_prompt(), Some("the prompt"));
        assert_eq!(request.max_tokens, 500);
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_shared_path_wraps_transport_failures() {
        let mock = Arc::new(MockTransport::new());
        mock.push_reply(MockReply::error(CompletionError::Network(
            "connection refused".to_string(),
        )));
        let client = client(&mock, Some("sk-server"));

        let err = client
            .generate_response("hi", "sys", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "server_action_error");
    }

    #[tokio::test]
    async fn test_shared_path_keeps_provider_errors() {
        let mock = Arc::new(MockTransport::new());
        mock.push_reply(MockReply::error(CompletionError::Api {
            status: 429,
            code: Some("rate_limit_exceeded".to_string()),
            message: "slow down".to_string(),
        }));
        let client = client(&mock, Some("sk-server"));

        let err = client
            .generate_response("hi", "sys", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_user_path_keeps_network_errors() {
        let mock = Arc::new(MockTransport::new());
        mock.push_reply(MockReply::error(CompletionError::Network("down".to_string())));
        let client = client(&mock, None);

        let err = client
            .generate_response("hi", "sys", &user_options("sk-user"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "network_error");
    }

    #[tokio::test]
    async fn test_availability_is_false_on_failure_or_missing_key() {
        let mock = Arc::new(MockTransport::new());
        assert!(!client(&mock, None).check_availability(None).await);
        assert_eq!(mock.probe_calls(), 0);

        let client = client(&mock, Some("sk-server"));
        assert!(client.check_availability(None).await);
        mock.set_available(false);
        assert!(!client.check_availability(None).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_availability_with_retry_probes_each_attempt() {
        let mock = Arc::new(MockTransport::new());
        mock.set_available(false);
        let client = client(&mock, Some("sk-server"));

        let available = client
            .check_availability_with_retry(None, RetryPolicy::new(2, Duration::from_millis(10)))
            .await;
        assert!(!available);
        assert_eq!(mock.probe_calls(), 3);
    }

    #[tokio::test]
    async fn test_summary_prompt_and_fallbacks() {
        let mock = Arc::new(MockTransport::new());
        let client = client(&mock, Some("sk-server"));
        let options = CompletionOptions::default();

        assert_eq!(client.generate_summary("   ", &options).await, "");
        assert_eq!(mock.calls(), 0);

        mock.push_reply(MockReply::text("A short summary."));
        assert_eq!(
            client.generate_summary("Some text", &options).await,
            "A short summary."
        );
        let request = mock.last_request().unwrap();
        assert_eq!(
            request.user_prompt(),
            Some("Summarize the following text in 2-3 sentences:\n\nSome text")
        );
        assert_eq!(request.system_prompt(), Some(SUMMARY_SYSTEM_PROMPT));

        mock.push_reply(MockReply::error(CompletionError::Mock("boom".to_string())));
        assert_eq!(
            client.generate_summary("Some text", &options).await,
            "Unable to generate summary"
        );
    }

    #[tokio::test]
    async fn test_stream_response_forwards_chunks() {
        let mock = Arc::new(MockTransport::new());
        mock.push_reply(MockReply::text("quiet words"));
        let client = client(&mock, Some("sk-server"));

        let mut collected = String::new();
        client
            .stream_response(
                "hi",
                "sys",
                &CompletionOptions::default(),
                &mut |chunk: &str| collected.push_str(chunk),
            )
            .await
            .unwrap();
        assert_eq!(collected.trim_end(), "quiet words");
    }
}
