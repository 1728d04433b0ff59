use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use ng12_core::error::AppError;

use super::{ConversationSession, ConversationStore, Turn};

type History = Arc<Mutex<Vec<Turn>>>;

/// Process-lifetime store: a concurrent map of per-key locked histories.
///
/// The map is only touched to find or create a key's history; the per-key mutex is taken after
/// the map guard is released, so a long append on one key never holds up another key.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    sessions: DashMap<String, History>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn history_for(&self, key: &str) -> History {
        if let Some(h) = self.sessions.get(key) {
            return Arc::clone(h.value());
        }
        Arc::clone(
            self.sessions
                .entry(key.to_string())
                .or_default()
                .value(),
        )
    }

    fn existing(&self, key: &str) -> Option<History> {
        self.sessions.get(key).map(|h| Arc::clone(h.value()))
    }
}

fn lock(h: &Mutex<Vec<Turn>>) -> MutexGuard<'_, Vec<Turn>> {
    // A panic while holding the lock cannot leave a half-written turn: pushes are single calls.
    h.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConversationStore for InMemoryConversationStore {
    fn get(&self, key: &str) -> ConversationSession {
        let history = self.history_for(key);
        let turns = lock(&history).clone();
        ConversationSession {
            key: key.to_string(),
            turns,
        }
    }

    fn append(&self, key: &str, turn: Turn) -> Result<usize, AppError> {
        let history = self.history_for(key);
        let mut turns = lock(&history);
        turns.push(turn);
        Ok(turns.len())
    }

    fn append_all(&self, key: &str, new_turns: Vec<Turn>) -> Result<usize, AppError> {
        let history = self.history_for(key);
        let mut turns = lock(&history);
        turns.extend(new_turns);
        Ok(turns.len())
    }

    fn clear(&self, key: &str) -> Result<(), AppError> {
        if let Some(history) = self.existing(key) {
            lock(&history).clear();
        }
        Ok(())
    }

    fn history(&self, key: &str) -> Vec<Turn> {
        match self.existing(key) {
            Some(history) => lock(&history).clone(),
            None => Vec::new(),
        }
    }
}
