use async_trait::async_trait;
use ractor::{Actor, ActorRef};
use shared_types::{ChatMessage, Settings, SettingsPatch};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::autosave::{
    AutosaveActor, AutosaveArguments, AutosaveMsg, AutosaveStatus, AutosaveTarget, TickOutcome,
};
use crate::completion::CompletionClient;
use crate::conversation::ConversationStore;
use crate::diff::summarize_diff;
use crate::note::{NoteError, NoteStore, SaveOutcome};
use crate::retry::RetryPolicy;
use crate::settings::{SettingsError, SettingsStore, SettingsUpdate};
use crate::storage::Storage;

/// A finished save plus the response cycle it started, if any.
pub struct SaveAndRespond {
    pub outcome: SaveOutcome,
    /// One-line description of the diff, empty when nothing changed.
    pub summary: String,
    pub response: Option<JoinHandle<ChatMessage>>,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    storage: Storage,
    client: CompletionClient,
    settings: Arc<SettingsStore>,
    note: Arc<NoteStore>,
    conversation: Arc<ConversationStore>,
    autosave: Mutex<Option<ActorRef<AutosaveMsg>>>,
}

impl AppState {
    pub fn new(storage: Storage, client: CompletionClient, defaults: Settings) -> Self {
        Self::with_retry_policy(storage, client, defaults, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        storage: Storage,
        client: CompletionClient,
        defaults: Settings,
        retry: RetryPolicy,
    ) -> Self {
        let settings = Arc::new(SettingsStore::load(storage.clone(), defaults));
        let note = Arc::new(NoteStore::load(storage.clone()));
        let conversation = Arc::new(
            ConversationStore::load(storage.clone(), client.clone(), settings.clone())
                .with_retry_policy(retry),
        );

        Self {
            inner: Arc::new(AppStateInner {
                storage,
                client,
                settings,
                note,
                conversation,
                autosave: Mutex::new(None),
            }),
        }
    }

    pub fn client(&self) -> &CompletionClient {
        &self.inner.client
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.inner.settings
    }

    pub fn note(&self) -> &NoteStore {
        &self.inner.note
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.inner.conversation
    }

    /// Save the note and, when it changed, start a response cycle for the
    /// new diff. The cycle runs in the background.
    pub fn save_and_respond(&self) -> Result<SaveAndRespond, NoteError> {
        let settings = self.inner.settings.get();
        let outcome = self.inner.note.save(settings.max_diff_queue)?;

        let Some(diff) = outcome.diff.clone() else {
            return Ok(SaveAndRespond {
                outcome,
                summary: String::new(),
                response: None,
            });
        };

        let summary = summarize_diff(&diff.changes);
        let conversation = self.inner.conversation.clone();
        let content = outcome.content.clone();
        let history = outcome.diff_queue.clone();
        let response = tokio::spawn(async move {
            conversation
                .process_new_diff(&diff, &content, &history)
                .await
        });

        Ok(SaveAndRespond {
            outcome,
            summary,
            response: Some(response),
        })
    }

    pub async fn ensure_autosave(&self) -> Result<ActorRef<AutosaveMsg>, String> {
        let mut guard = self.inner.autosave.lock().await;
        if let Some(actor) = guard.as_ref() {
            return Ok(actor.clone());
        }

        let interval = Duration::from_millis(self.inner.settings.get().auto_save_interval_ms);
        let (actor, _) = Actor::spawn(
            Some(format!("autosave:{}", ulid::Ulid::new())),
            AutosaveActor,
            AutosaveArguments {
                target: Arc::new(self.clone()),
                interval,
            },
        )
        .await
        .map_err(|e| e.to_string())?;

        *guard = Some(actor.clone());
        Ok(actor)
    }

    /// Restart the timer with the current interval setting. No-op when the
    /// scheduler is not running.
    pub async fn rearm_autosave(&self) {
        let guard = self.inner.autosave.lock().await;
        if let Some(actor) = guard.as_ref() {
            let interval = Duration::from_millis(self.inner.settings.get().auto_save_interval_ms);
            if let Err(e) = actor.cast(AutosaveMsg::Rearm { interval }) {
                tracing::warn!(error = %e, "Failed to re-arm autosave timer");
            }
        }
    }

    pub async fn stop_autosave(&self) {
        if let Some(actor) = self.inner.autosave.lock().await.take() {
            actor.stop(None);
        }
    }

    pub async fn autosave_status(&self) -> Option<AutosaveStatus> {
        let actor = self.inner.autosave.lock().await.clone()?;
        ractor::call!(actor, |reply| AutosaveMsg::GetStatus { reply }).ok()
    }

    pub async fn update_settings(
        &self,
        patch: SettingsPatch,
    ) -> Result<SettingsUpdate, SettingsError> {
        let update = self.inner.settings.update(patch)?;
        if update.interval_changed {
            self.rearm_autosave().await;
        }
        Ok(update)
    }

    /// Wipe persistence and return every store to its initial state.
    pub async fn reset(&self) -> bool {
        let cleared = self.inner.storage.clear();
        self.inner.settings.reset();
        self.inner.note.reset();
        self.inner.conversation.reset();
        self.rearm_autosave().await;
        tracing::info!(cleared, "Application state reset");
        cleared
    }
}

#[async_trait]
impl AutosaveTarget for AppState {
    async fn autosave(&self) -> TickOutcome {
        match self.save_and_respond() {
            Ok(saved) => TickOutcome::Saved {
                diff_id: saved.outcome.diff.map(|d| d.id),
            },
            Err(NoteError::SaveInProgress) => TickOutcome::Skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{MockReply, MockTransport};
    use crate::note::WELCOME_NOTE;

    fn state_with(mock: &Arc<MockTransport>) -> AppState {
        let client = CompletionClient::new(mock.clone(), Some("sk-server".to_string()));
        AppState::with_retry_policy(
            Storage::in_memory(),
            client,
            Settings::default(),
            RetryPolicy::none(),
        )
    }

    #[tokio::test]
    async fn test_save_and_respond_appends_reply_for_diff() {
        let mock = Arc::new(MockTransport::new());
        mock.push_reply(MockReply::text("Nice edit."));
        let state = state_with(&mock);

        state.note().set_content(format!("{WELCOME_NOTE}\nA new line"));
        let saved = state.save_and_respond().unwrap();
        let diff = saved.outcome.diff.clone().unwrap();
        assert!(saved.summary.contains("addition"));

        let reply = saved.response.unwrap().await.unwrap();
        assert_eq!(reply.content, "Nice edit.");
        assert_eq!(reply.diff_id, Some(diff.id));
        assert_eq!(state.conversation().snapshot().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_clean_note_starts_no_cycle() {
        let mock = Arc::new(MockTransport::new());
        let state = state_with(&mock);

        let saved = state.save_and_respond().unwrap();
        assert!(saved.response.is_none());
        assert!(saved.summary.is_empty());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_autosave_target_skips_during_save() {
        let mock = Arc::new(MockTransport::new());
        let state = state_with(&mock);

        let guard = state.note().begin_save().unwrap();
        assert_eq!(state.autosave().await, TickOutcome::Skipped);
        drop(guard);
        assert_eq!(state.autosave().await, TickOutcome::Saved { diff_id: None });
    }

    #[tokio::test]
    async fn test_ensure_autosave_is_idempotent_and_rearms_on_interval_change() {
        let mock = Arc::new(MockTransport::new());
        let state = state_with(&mock);

        let first = state.ensure_autosave().await.unwrap();
        let second = state.ensure_autosave().await.unwrap();
        assert_eq!(first.get_id(), second.get_id());

        state
            .update_settings(SettingsPatch {
                auto_save_interval_ms: Some(45_000),
                ..Default::default()
            })
            .await
            .unwrap();

        let status = state.autosave_status().await.unwrap();
        assert_eq!(status.interval_ms, 45_000);

        state.stop_autosave().await;
        assert!(state.autosave_status().await.is_none());
    }

    #[tokio::test]
    async fn test_autosave_on_clean_note_records_no_save() {
        let mock = Arc::new(MockTransport::new());
        let client = CompletionClient::new(mock.clone(), Some("sk-server".to_string()));
        let state = AppState::with_retry_policy(
            Storage::in_memory(),
            client,
            Settings {
                auto_save_interval_ms: 20,
                ..Settings::default()
            },
            RetryPolicy::none(),
        );
        let saved_at = state.note().snapshot().last_save_time;

        state.ensure_autosave().await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        let status = state.autosave_status().await.unwrap();
        assert!(status.ticks >= 1);
        assert_eq!(status.saves, 0);
        assert!(status.last_save_ms.is_none());
        assert_eq!(state.note().snapshot().last_save_time, saved_at);
        assert_eq!(mock.calls(), 0);
        state.stop_autosave().await;
    }

    #[tokio::test]
    async fn test_reset_clears_queue_and_chat() {
        let mock = Arc::new(MockTransport::new());
        let state = state_with(&mock);

        state.note().set_content("Something new".to_string());
        let saved = state.save_and_respond().unwrap();
        saved.response.unwrap().await.unwrap();

        assert!(state.reset().await);
        assert!(state.note().snapshot().diff_queue.is_empty());
        assert_eq!(state.note().current(), WELCOME_NOTE);
        assert!(state.conversation().snapshot().messages.is_empty());
    }
}
