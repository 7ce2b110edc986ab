//! Settings store.
//!
//! Holds the live [`Settings`] record, persists it as one JSON value and
//! publishes every change to subscribers.

use shared_types::{Settings, SettingsPatch};
use tokio::sync::watch;

use crate::storage::{keys, Storage};

pub const MIN_AUTO_SAVE_INTERVAL_MS: u64 = 1_000;
pub const MAX_DIFF_QUEUE_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl SettingsError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result of a successful update.
#[derive(Debug, Clone)]
pub struct SettingsUpdate {
    pub settings: Settings,
    pub interval_changed: bool,
    pub persisted: bool,
}

pub struct SettingsStore {
    storage: Storage,
    defaults: Settings,
    state: watch::Sender<Settings>,
}

impl SettingsStore {
    /// Load stored settings, falling back to `defaults` for anything
    /// missing.
    pub fn load(storage: Storage, defaults: Settings) -> Self {
        let initial = storage
            .get::<Settings>(keys::SETTINGS)
            .unwrap_or_else(|| defaults.clone());
        tracing::debug!(
            auto_save_interval_ms = initial.auto_save_interval_ms,
            max_diff_queue = initial.max_diff_queue,
            model = %initial.ai_model,
            "Settings loaded"
        );

        let (state, _) = watch::channel(initial);
        Self {
            storage,
            defaults,
            state,
        }
    }

    pub fn get(&self) -> Settings {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.state.subscribe()
    }

    /// Apply a partial update. Nothing changes if any field is invalid.
    pub fn update(&self, patch: SettingsPatch) -> Result<SettingsUpdate, SettingsError> {
        let storage = &self.storage;
        let mut result = None;
        // Validate and commit under the channel lock so concurrent patches
        // apply one after the other.
        self.state.send_if_modified(|current| {
            match apply_patch(current.clone(), patch) {
                Ok(next) => {
                    let interval_changed =
                        next.auto_save_interval_ms != current.auto_save_interval_ms;
                    let persisted = storage.set(keys::SETTINGS, &next);
                    *current = next.clone();
                    result = Some(Ok(SettingsUpdate {
                        settings: next,
                        interval_changed,
                        persisted,
                    }));
                    true
                }
                Err(e) => {
                    result = Some(Err(e));
                    false
                }
            }
        });

        let update = result.unwrap_or_else(|| {
            Err(SettingsError::invalid("settings", "update was not applied"))
        })?;
        tracing::info!(
            interval_changed = update.interval_changed,
            persisted = update.persisted,
            has_api_key = update.settings.user_api_key().is_some(),
            "Settings updated"
        );
        Ok(update)
    }

    /// Back to configured defaults (in memory only; storage is cleared by
    /// the caller).
    pub fn reset(&self) {
        self.state.send_replace(self.defaults.clone());
    }
}

/// Validate `patch` and merge it into `settings`. Nothing is applied when any
/// field is rejected.
pub fn apply_patch(
    mut settings: Settings,
    patch: SettingsPatch,
) -> Result<Settings, SettingsError> {
    if let Some(interval) = patch.auto_save_interval_ms {
        if interval < MIN_AUTO_SAVE_INTERVAL_MS {
            return Err(SettingsError::invalid(
                "autoSaveIntervalMs",
                format!("must be at least {MIN_AUTO_SAVE_INTERVAL_MS}"),
            ));
        }
        settings.auto_save_interval_ms = interval;
    }
    if let Some(max) = patch.max_diff_queue {
        if max == 0 || max > MAX_DIFF_QUEUE_LIMIT {
            return Err(SettingsError::invalid(
                "maxDiffQueue",
                format!("must be between 1 and {MAX_DIFF_QUEUE_LIMIT}"),
            ));
        }
        settings.max_diff_queue = max;
    }
    if let Some(prompt) = patch.system_prompt {
        if prompt.trim().is_empty() {
            return Err(SettingsError::invalid("systemPrompt", "must not be empty"));
        }
        settings.system_prompt = prompt;
    }
    if let Some(key) = patch.openai_api_key {
        settings.openai_api_key = key.trim().to_string();
    }
    if let Some(model) = patch.ai_model {
        if model.trim().is_empty() {
            return Err(SettingsError::invalid("aiModel", "must not be empty"));
        }
        settings.ai_model = model.trim().to_string();
    }
    if let Some(max_tokens) = patch.max_tokens {
        if max_tokens == 0 {
            return Err(SettingsError::invalid("maxTokens", "must be positive"));
        }
        settings.max_tokens = max_tokens;
    }
    if let Some(temperature) = patch.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(SettingsError::invalid(
                "temperature",
                "must be between 0 and 2",
            ));
        }
        settings.temperature = temperature;
    }
    Ok(settings)
}
