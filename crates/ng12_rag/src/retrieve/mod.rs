use std::sync::Arc;

use ng12_core::error::{codes, AppError};
use tracing::debug;

use crate::conversation::{Role, Turn};
use crate::embeddings::Embedder;
use crate::index::{ScoredPassage, VectorIndex};

/// Passages for one query plus the query text that was actually embedded.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub refined_query: String,
    pub passages: Vec<ScoredPassage>,
}

#[derive(Debug, Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    conversation_window: usize,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, conversation_window: usize) -> Self {
        Self {
            index,
            conversation_window,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Refine, embed, query. Passages come back in the index's own order, unchanged.
    pub fn retrieve(
        &self,
        query: &str,
        embedder: &dyn Embedder,
        context: &[Turn],
        top_k: usize,
    ) -> Result<Retrieval, AppError> {
        if query.trim().is_empty() {
            return Err(AppError::new(
                codes::EMBEDDINGS_FAILED,
                "Query must not be empty",
            ));
        }

        let refined_query = refine_query(query, context, self.conversation_window);
        let vector = embedder.embed(&refined_query)?;
        let passages = self.index.query(&vector, top_k)?;

        debug!(
            top_k,
            hits = passages.len(),
            history_turns = context.len(),
            "retrieval complete"
        );

        Ok(Retrieval {
            refined_query,
            passages,
        })
    }
}

/// Fold the last `window` user turns into the query.
///
/// Older turns are dropped first; the kept turns stay in chronological order. Assistant turns
/// are ignored. With no prior user turns the message is returned unchanged.
pub fn refine_query(message: &str, context: &[Turn], window: usize) -> String {
    let message = message.trim();
    let prior: Vec<&str> = context
        .iter()
        .filter(|t| t.role == Role::User)
        .map(|t| t.text.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if prior.is_empty() || window == 0 {
        return message.to_string();
    }

    let kept = &prior[prior.len().saturating_sub(window)..];
    let mut out = String::from("Previous questions:\n");
    for q in kept {
        out.push_str("- ");
        out.push_str(q);
        out.push('\n');
    }
    out.push_str("Current question: ");
    out.push_str(message);
    out
}
