//! Conversation store and the diff-to-response pipeline.
//!
//! Each saved diff runs one cycle: build a prompt from the recent diffs and
//! note content, ask the completion client (with retry), then append exactly
//! one assistant message. Cycles may overlap; messages land in the order
//! responses arrive and `is_loading` stays true while any cycle is running.

use shared_types::{ChatMessage, ChatRole, ChatState, DiffRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::completion::{CompletionClient, CompletionError, CompletionOptions};
use crate::diff_queue;
use crate::error_log::{self, ErrorContext, ErrorDetails, ErrorSeverity, ErrorType};
use crate::prompt::{build_diff_prompt, DIFF_HISTORY};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::settings::SettingsStore;
use crate::storage::{keys, Storage};

pub const RATE_LIMIT_MESSAGE: &str =
    "I'm receiving too many requests right now. Please try again in a moment.";
pub const CONTEXT_LENGTH_MESSAGE: &str = "Your document is getting long. I'm having trouble processing all of it at once. Try focusing on a specific section.";
pub const MISSING_KEY_MESSAGE: &str =
    "I need an OpenAI API key to respond. Please add one in the settings.";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "I had trouble processing your recent changes. Please continue writing.";

/// User-facing text for a failed cycle.
pub fn fallback_message(error: &CompletionError) -> &'static str {
    if matches!(error, CompletionError::MissingApiKey) {
        MISSING_KEY_MESSAGE
    } else if error.is_rate_limited() {
        RATE_LIMIT_MESSAGE
    } else if error.is_context_length_exceeded() {
        CONTEXT_LENGTH_MESSAGE
    } else {
        GENERIC_FAILURE_MESSAGE
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn new_message(role: ChatRole, content: String) -> ChatMessage {
    ChatMessage {
        id: uuid::Uuid::new_v4().to_string(),
        role,
        content,
        timestamp: now_ms(),
        diff_id: None,
        original_prompt: None,
    }
}

#[derive(Debug, Default)]
struct LastCycle {
    diff: Option<DiffRecord>,
    note_content: Option<String>,
}

/// Keeps `is_loading` raised for as long as it lives.
pub struct LoadingGuard<'a> {
    store: &'a ConversationStore,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let in_flight = &self.store.in_flight;
        self.store.state.send_modify(|chat| {
            let remaining = in_flight.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
            chat.is_loading = remaining > 0;
        });
    }
}

pub struct ConversationStore {
    storage: Storage,
    client: CompletionClient,
    settings: Arc<SettingsStore>,
    retry: RetryPolicy,
    state: watch::Sender<ChatState>,
    in_flight: AtomicUsize,
    last: Mutex<LastCycle>,
}

impl ConversationStore {
    pub fn load(storage: Storage, client: CompletionClient, settings: Arc<SettingsStore>) -> Self {
        let messages = storage
            .get::<Vec<ChatMessage>>(keys::CHAT_LOG)
            .unwrap_or_default();
        tracing::info!(messages = messages.len(), "Chat store initialized");

        let (state, _) = watch::channel(ChatState {
            messages,
            is_loading: false,
            error: None,
        });
        Self {
            storage,
            client,
            settings,
            retry: RetryPolicy::default(),
            state,
            in_flight: AtomicUsize::new(0),
            last: Mutex::new(LastCycle::default()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn last_diff(&self) -> Option<DiffRecord> {
        self.last.lock().ok().and_then(|last| last.diff.clone())
    }

    pub fn last_note_content(&self) -> Option<String> {
        self.last.lock().ok().and_then(|last| last.note_content.clone())
    }

    pub fn begin_loading(&self) -> LoadingGuard<'_> {
        let in_flight = &self.in_flight;
        self.state.send_modify(|chat| {
            in_flight.fetch_add(1, Ordering::AcqRel);
            chat.is_loading = true;
        });
        LoadingGuard { store: self }
    }

    /// Append a message authored by the user.
    pub fn add_user_message(&self, content: String) -> ChatMessage {
        let message = new_message(ChatRole::User, content);
        self.append(message.clone(), None);
        message
    }

    /// Empty the log. Returns whether the empty log was persisted.
    pub fn clear_messages(&self) -> bool {
        let mut persisted = false;
        self.state.send_modify(|chat| {
            chat.messages.clear();
            chat.error = None;
            persisted = self.storage.set(keys::CHAT_LOG, &chat.messages);
        });
        persisted
    }

    /// Forget everything in memory (storage is cleared by the caller).
    pub fn reset(&self) {
        self.state.send_modify(|chat| {
            chat.messages.clear();
            chat.error = None;
        });
        if let Ok(mut last) = self.last.lock() {
            *last = LastCycle::default();
        }
    }

    /// Push the message and persist the log in one step so the stored log
    /// always matches the published one.
    fn append(&self, message: ChatMessage, set_error: Option<Option<String>>) {
        let storage = &self.storage;
        self.state.send_modify(|chat| {
            chat.messages.push(message);
            if let Some(error) = set_error {
                chat.error = error;
            }
            if !storage.set(keys::CHAT_LOG, &chat.messages) {
                tracing::warn!(messages = chat.messages.len(), "Chat log kept in memory only");
            }
        });
    }

    /// Run one response cycle for `diff`. `history` is the diff queue the
    /// diff was saved into; the latest diffs from it go into the prompt.
    ///
    /// Never fails: errors become a fallback assistant message. Returns the
    /// message that was appended.
    pub async fn process_new_diff(
        &self,
        diff: &DiffRecord,
        note_content: &str,
        history: &[DiffRecord],
    ) -> ChatMessage {
        let _loading = self.begin_loading();
        let settings = self.settings.get();
        let options = CompletionOptions::from_settings(&settings);

        tracing::info!(
            diff_id = %diff.id,
            credential = self.client.credential(options.api_key.as_deref()).source(),
            "Processing diff"
        );

        let result = if !self.client.has_credential(options.api_key.as_deref()) {
            Err(CompletionError::MissingApiKey)
        } else {
            let context = diff_queue::recent_context(history, diff, DIFF_HISTORY);
            let prompt = build_diff_prompt(&context, note_content);
            tracing::debug!(
                prompt_len = prompt.len(),
                diffs = context.len(),
                "Sending diff prompt"
            );
            retry_with_backoff(self.retry, || {
                self.client
                    .generate_response(&prompt, &settings.system_prompt, &options)
            })
            .await
            .map(|text| (text, prompt))
        };

        let message = match result {
            Ok((text, prompt)) => {
                let mut message = new_message(ChatRole::Assistant, text);
                message.diff_id = Some(diff.id.clone());
                message.original_prompt = Some(prompt);
                self.append(message.clone(), Some(None));
                tracing::info!(diff_id = %diff.id, message_id = %message.id, "Response appended");
                message
            }
            Err(e) => {
                let fallback = fallback_message(&e);
                error_log::log_error(&ErrorDetails {
                    error_type: ErrorType::AiService,
                    severity: ErrorSeverity::Error,
                    message: "Diff response cycle failed".to_string(),
                    cause: Some(e.to_string()),
                    context: ErrorContext::new("conversation", "process_new_diff").with_data(
                        serde_json::json!({ "diff_id": diff.id, "code": e.code() }),
                    ),
                });

                let mut message = new_message(ChatRole::Assistant, fallback.to_string());
                message.diff_id = Some(diff.id.clone());
                self.append(message.clone(), Some(Some(fallback.to_string())));
                message
            }
        };

        if let Ok(mut last) = self.last.lock() {
            last.diff = Some(diff.clone());
            last.note_content = Some(note_content.to_string());
        }
        message
    }
}
