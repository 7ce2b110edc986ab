//! Whisperdraft - a note editor with a quiet AI companion
//!
//! The note is diffed against its last saved version on every save, and each
//! new diff drives one completion request whose reply lands in the chat log.
//! Everything persists to a small key-value store.

pub mod api;
pub mod app_state;
pub mod autosave;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod diff;
pub mod diff_queue;
pub mod error_log;
pub mod note;
pub mod prompt;
pub mod retry;
pub mod settings;
pub mod storage;
