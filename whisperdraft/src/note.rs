//! Content store: live note text, saved baseline and the diff queue.

use shared_types::{DiffRecord, NoteSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

use crate::diff::compute_diff;
use crate::diff_queue;
use crate::storage::{keys, Storage};

pub const WELCOME_NOTE: &str = r#"# Welcome to Whisperdraft

A shack for thought, with a ghost in the walls.

Whisperdraft is a minimalist writing environment where your thoughts evolve freely, and an AI companion responds softly from the side. The left panel is yours, a quiet cabin for ideas. On the right, a presence listens. Every few lines, it stirs, offering suggestions or reflections drawn from your recent edits. It's not here to lead. Just to witness, reflect, and gently echo back.

## How to use

1. Start writing in this panel
2. Your changes will be saved automatically every 30 seconds
3. The AI companion will respond to your changes in the right panel
4. You can also manually save by clicking the "Save" button

## Philosophy

Born from a "build shacks, not cathedrals" philosophy, Whisperdraft is designed to be small, local-first, and modular. It stores diffs, tracks note evolution, and talks to an LLM, but only when asked. Ideal for writers, thinkers, and neurodivergent dreamers who want a space that honors process over polish.
"#;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NoteError {
    #[error("a save is already in progress")]
    SaveInProgress,
}

/// What a save produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// New diff, when the note had changed since the last save.
    pub diff: Option<DiffRecord>,
    /// Note text the save captured.
    pub content: String,
    /// Diff queue after the save.
    pub diff_queue: Vec<DiffRecord>,
    pub persisted: bool,
}

/// Clears the in-progress flag when dropped.
pub struct SaveGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct NoteStore {
    storage: Storage,
    state: watch::Sender<NoteSnapshot>,
    saving: AtomicBool,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn welcome_snapshot() -> NoteSnapshot {
    NoteSnapshot {
        current: WELCOME_NOTE.to_string(),
        base: WELCOME_NOTE.to_string(),
        is_dirty: false,
        last_save_time: now_ms(),
        diff_queue: Vec::new(),
    }
}

impl NoteStore {
    /// Restore from storage. A first run starts from the welcome note.
    pub fn load(storage: Storage) -> Self {
        let current = storage
            .get::<String>(keys::NOTE_CURRENT)
            .unwrap_or_else(|| WELCOME_NOTE.to_string());
        let base = storage
            .get::<String>(keys::NOTE_BASE)
            .unwrap_or_else(|| current.clone());
        let diff_queue = storage
            .get::<Vec<DiffRecord>>(keys::NOTE_DIFF_QUEUE)
            .unwrap_or_default();

        tracing::info!(
            current_len = current.len(),
            base_len = base.len(),
            queued_diffs = diff_queue.len(),
            "Note store initialized"
        );

        let (state, _) = watch::channel(NoteSnapshot {
            is_dirty: current != base,
            current,
            base,
            last_save_time: now_ms(),
            diff_queue,
        });
        Self {
            storage,
            state,
            saving: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> NoteSnapshot {
        self.state.borrow().clone()
    }

    pub fn current(&self) -> String {
        self.state.borrow().current.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NoteSnapshot> {
        self.state.subscribe()
    }

    /// Replace the live text. The text is written through immediately;
    /// the return value reports whether that write succeeded.
    pub fn set_content(&self, content: String) -> bool {
        let persisted = self.storage.set(keys::NOTE_CURRENT, &content);
        self.state.send_modify(|note| {
            note.is_dirty = content != note.base;
            note.current = content;
        });
        if !persisted {
            tracing::warn!("Note content kept in memory only");
        }
        persisted
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    /// Claim the save slot, or `None` when a save is running.
    pub fn begin_save(&self) -> Option<SaveGuard<'_>> {
        self.saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SaveGuard {
                flag: &self.saving,
            })
    }

    /// Diff the live text against the baseline, queue the diff and move the
    /// baseline forward.
    pub fn save(&self, max_diff_queue: usize) -> Result<SaveOutcome, NoteError> {
        let _guard = self.begin_save().ok_or(NoteError::SaveInProgress)?;
        Ok(self.save_locked(max_diff_queue))
    }

    fn save_locked(&self, max_diff_queue: usize) -> SaveOutcome {
        let before = self.snapshot();
        if before.current == before.base {
            tracing::debug!("No changes detected, skipping diff generation");
            return SaveOutcome {
                diff: None,
                content: before.current,
                diff_queue: before.diff_queue,
                persisted: true,
            };
        }

        let content = before.current;
        let diff = compute_diff(&before.base, &content).map(|changes| DiffRecord {
            id: ulid::Ulid::new().to_string(),
            timestamp: now_ms(),
            changes,
        });

        let mut queue = before.diff_queue;
        let mut persisted = true;
        if let Some(diff) = &diff {
            queue = diff_queue::push(queue, diff.clone(), max_diff_queue.max(1));
            persisted &= self.storage.set(keys::NOTE_DIFF_QUEUE, &queue);
        }
        persisted &= self.storage.set(keys::NOTE_CURRENT, &content);
        persisted &= self.storage.set(keys::NOTE_BASE, &content);

        let saved_at = now_ms();
        self.state.send_modify(|note| {
            note.base = content.clone();
            note.is_dirty = note.current != note.base;
            note.last_save_time = saved_at;
            note.diff_queue = queue.clone();
        });

        tracing::info!(
            diff_id = diff.as_ref().map(|d| d.id.as_str()).unwrap_or(""),
            queued_diffs = queue.len(),
            persisted,
            "Note saved"
        );
        SaveOutcome {
            diff,
            content,
            diff_queue: queue,
            persisted,
        }
    }

    /// Back to the welcome note with an empty queue.
    pub fn reset(&self) {
        self.state.send_replace(welcome_snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKvStore;
    use std::sync::Arc;

    #[test]
    fn test_first_load_seeds_welcome_note_as_clean() {
        let store = NoteStore::load(Storage::in_memory());
        let note = store.snapshot();
        assert_eq!(note.current, WELCOME_NOTE);
        assert_eq!(note.base, WELCOME_NOTE);
        assert!(!note.is_dirty);
    }

    #[test]
    fn test_save_without_changes_yields_no_diff() {
        let store = NoteStore::load(Storage::in_memory());
        let outcome = store.save(5).unwrap();
        assert!(outcome.diff.is_none());
        assert!(outcome.diff_queue.is_empty());
    }

    #[test]
    fn test_save_produces_diff_and_moves_baseline() {
        let storage = Storage::in_memory();
        storage.set(keys::NOTE_CURRENT, "Hello\nworld");
        let store = NoteStore::load(storage.clone());

        assert!(store.set_content("Hello\nbrave world".to_string()));
        assert!(store.snapshot().is_dirty);

        let outcome = store.save(5).unwrap();
        let diff = outcome.diff.unwrap();
        assert!(diff.changes.contains("- world"));
        assert!(diff.changes.contains("+ brave world"));
        assert!(outcome.persisted);

        let note = store.snapshot();
        assert_eq!(note.base, "Hello\nbrave world");
        assert!(!note.is_dirty);
        assert_eq!(note.diff_queue, vec![diff.clone()]);

        let reloaded = NoteStore::load(storage);
        assert_eq!(reloaded.snapshot().base, "Hello\nbrave world");
        assert_eq!(reloaded.snapshot().diff_queue, vec![diff]);
    }

    #[test]
    fn test_queue_respects_max_size() {
        let store = NoteStore::load(Storage::in_memory());
        for n in 0..4 {
            store.set_content(format!("version {n}"));
            store.save(2).unwrap();
        }
        assert_eq!(store.snapshot().diff_queue.len(), 2);
    }

    #[test]
    fn test_save_skipped_while_another_is_running() {
        let store = NoteStore::load(Storage::in_memory());
        store.set_content("changed".to_string());

        let guard = store.begin_save().unwrap();
        assert!(store.is_saving());
        assert_eq!(store.save(5), Err(NoteError::SaveInProgress));
        drop(guard);

        assert!(!store.is_saving());
        assert!(store.save(5).unwrap().diff.is_some());
    }

    #[test]
    fn test_set_content_reports_storage_failure() {
        let storage = Storage::new(Arc::new(MemoryKvStore::with_quota(8)));
        let store = NoteStore::load(storage);
        assert!(!store.set_content("far too long for the quota".to_string()));
        assert_eq!(store.current(), "far too long for the quota");
    }

    #[tokio::test]
    async fn test_subscribers_observe_edits() {
        let store = NoteStore::load(Storage::in_memory());
        let mut rx = store.subscribe();
        store.set_content("draft".to_string());
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().current, "draft");
    }

    #[test]
    fn test_reset_returns_to_welcome_note() {
        let store = NoteStore::load(Storage::in_memory());
        store.set_content("something".to_string());
        store.save(5).unwrap();
        store.reset();
        let note = store.snapshot();
        assert_eq!(note.current, WELCOME_NOTE);
        assert!(note.diff_queue.is_empty());
    }
}
