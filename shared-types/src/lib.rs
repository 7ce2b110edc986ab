//! Shared types between the Whisperdraft backend and the browser client
//!
//! Everything here crosses the HTTP boundary as camelCase JSON, and is also
//! persisted verbatim in the local key-value store.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Default system prompt handed to the completion provider.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a thoughtful writing companion. Your responses should be quiet, present, and attentive to the user's writing. Offer gentle suggestions, reflections, or questions that might help the writer. Keep your responses brief and supportive.";

pub const DEFAULT_AUTO_SAVE_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_MAX_DIFF_QUEUE: usize = 5;
pub const DEFAULT_AI_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// ============================================================================
// Notes and diffs
// ============================================================================

/// One line-based diff between two saved snapshots. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct DiffRecord {
    pub id: String,
    /// Milliseconds since the Unix epoch
    #[ts(type = "number")]
    pub timestamp: i64,
    pub changes: String,
}

/// Note state as exposed to the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct NoteSnapshot {
    pub current: String,
    pub base: String,
    pub is_dirty: bool,
    #[ts(type = "number")]
    pub last_save_time: i64,
    pub diff_queue: Vec<DiffRecord>,
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "whisperdraft.ts")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Entry in the append-only chat log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    #[ts(type = "number")]
    pub timestamp: i64,
    /// Diff that triggered this assistant message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub diff_id: Option<String>,
    /// Prompt sent to the provider, kept for inspection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub original_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    pub is_loading: bool,
    pub error: Option<String>,
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_save_interval_ms: u64,
    pub max_diff_queue: usize,
    pub system_prompt: String,
    pub openai_api_key: String,
    pub ai_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_save_interval_ms: DEFAULT_AUTO_SAVE_INTERVAL_MS,
            max_diff_queue: DEFAULT_MAX_DIFF_QUEUE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            openai_api_key: String::new(),
            ai_model: DEFAULT_AI_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl Settings {
    /// User-supplied key, if one is set
    pub fn user_api_key(&self) -> Option<&str> {
        let key = self.openai_api_key.trim();
        (!key.is_empty()).then_some(key)
    }

    pub fn view(&self) -> SettingsView {
        SettingsView {
            auto_save_interval_ms: self.auto_save_interval_ms,
            max_diff_queue: self.max_diff_queue,
            system_prompt: self.system_prompt.clone(),
            has_api_key: self.user_api_key().is_some(),
            ai_model: self.ai_model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Settings as returned to the client; the API key never leaves the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct SettingsView {
    #[ts(type = "number")]
    pub auto_save_interval_ms: u64,
    #[ts(type = "number")]
    pub max_diff_queue: usize,
    pub system_prompt: String,
    pub has_api_key: bool,
    pub ai_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Partial settings update
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct SettingsPatch {
    #[ts(type = "number | null")]
    pub auto_save_interval_ms: Option<u64>,
    #[ts(type = "number | null")]
    pub max_diff_queue: Option<usize>,
    pub system_prompt: Option<String>,
    pub openai_api_key: Option<String>,
    pub ai_model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

// ============================================================================
// HTTP bodies
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct TextResponse {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    /// HTTP status returned by the completion provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub upstream_status: Option<u16>,
    /// Provider error code, e.g. `rate_limit_exceeded`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub upstream_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct HealthResponse {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error: Option<String>,
    pub server_time: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct SummaryRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct ContentRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct PersistResponse {
    pub persisted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "whisperdraft.ts")]
pub struct SaveResponse {
    pub diff: Option<DiffRecord>,
    pub summary: String,
    pub persisted: bool,
}
