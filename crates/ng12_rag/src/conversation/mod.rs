//! Per-key conversation history feeding query refinement.
//!
//! The key is opaque (a patient id or a session id, chosen by the caller). Histories are
//! append-only; `clear` resets a history to empty but keeps the key. Unknown keys read as empty
//! history, never as an error.

use ng12_core::error::AppError;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::citations::Citation;

mod memory;

pub use memory::InMemoryConversationStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            citations: Vec::new(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn assistant(text: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            citations,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSession {
    pub key: String,
    pub turns: Vec<Turn>,
}

/// Storage contract for conversation history. Backings other than the in-memory map (a durable
/// store, say) implement the same contract.
///
/// Appends and clears on one key are serialised; operations on different keys must not block
/// each other. Reads return owned snapshots.
pub trait ConversationStore: Send + Sync {
    /// Session for `key`, created empty if absent.
    fn get(&self, key: &str) -> ConversationSession;

    /// Append one turn; returns the new history length.
    fn append(&self, key: &str, turn: Turn) -> Result<usize, AppError>;

    /// Append several turns as one atomic step; returns the new history length.
    fn append_all(&self, key: &str, turns: Vec<Turn>) -> Result<usize, AppError>;

    /// Reset history for `key` to empty.
    fn clear(&self, key: &str) -> Result<(), AppError>;

    /// Snapshot of the history for `key`; empty for unknown keys.
    fn history(&self, key: &str) -> Vec<Turn>;
}
