use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{
    ChatCompletionRequest, ChatCompletionResponse, Choice, ChoiceMessage, CompletionError,
    CompletionTransport, Usage,
};

/// One scripted provider answer.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub delay: Duration,
    pub result: Result<String, CompletionError>,
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(text.into()),
        }
    }

    pub fn error(error: CompletionError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Offline stand-in for the provider.
///
/// Scripted replies are consumed first, in order. Once the script is empty
/// the transport answers with a canned reply chosen from the prompt text.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockReply>>,
    default_delay: Duration,
    unavailable: AtomicBool,
    completion_calls: AtomicUsize,
    probe_calls: AtomicUsize,
    requests: Mutex<Vec<ChatCompletionRequest>>,
    keys: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to canned (unscripted) replies.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn push_reply(&self, reply: MockReply) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Completion requests received so far (streaming included).
    pub fn calls(&self) -> usize {
        self.completion_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<ChatCompletionRequest> {
        self.requests().pop()
    }

    /// Keys presented by callers, in call order.
    pub fn keys_used(&self) -> Vec<String> {
        self.keys.lock().map(|keys| keys.clone()).unwrap_or_default()
    }

    async fn next_reply(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<String, CompletionError> {
        self.completion_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Ok(mut keys) = self.keys.lock() {
            keys.push(api_key.to_string());
        }

        let scripted = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());

        let reply = scripted.unwrap_or_else(|| MockReply {
            delay: self.default_delay,
            result: Ok(canned_reply(request.user_prompt().unwrap_or_default()).to_string()),
        });

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

fn canned_reply(prompt: &str) -> &'static str {
    let has_changes = prompt.contains("Recent changes:");
    let has_content = prompt.contains("current content:");
    let has_code = prompt.contains("```") || prompt.contains("function") || prompt.contains("class");
    let has_list = prompt.contains("- ") || prompt.contains("1. ");

    if prompt.to_lowercase().contains("summarize") {
        "This is a short summary of your text. It captures the main points."
    } else if has_changes && !has_content {
        "I notice you've made some changes to your document. Would you like feedback on a specific part?"
    } else if has_code {
        "I see you're working with code. Consider adding comments to explain the more complex parts."
    } else if has_list {
        "Your list is developing nicely. Consider grouping related items together."
    } else if prompt.contains('?') {
        "That's an interesting question. What counterarguments might someone raise?"
    } else {
        "I notice your writing is evolving thoughtfully. Consider exploring your ideas a little further."
    }
}

#[async_trait]
impl CompletionTransport for MockTransport {
    async fn chat_completion(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, CompletionError> {
        let text = self.next_reply(api_key, request).await?;
        let prompt_tokens = request.user_prompt().map(str::len).unwrap_or_default() as u32;
        let completion_tokens = text.len() as u32;

        Ok(ChatCompletionResponse {
            choices: vec![Choice {
                message: ChoiceMessage {
                    content: Some(text),
                },
            }],
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
            model: "whisperdraft-mock".to_string(),
        })
    }

    async fn stream_chat_completion(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<(), CompletionError> {
        let text = self.next_reply(api_key, request).await?;
        for word in text.split(' ') {
            on_chunk(&format!("{word} "));
        }
        Ok(())
    }

    async fn list_models(&self, _api_key: &str) -> Result<(), CompletionError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CompletionError::Mock("provider marked unavailable".to_string()));
        }
        Ok(())
    }
}
