use serde::Serialize;

use crate::index::ScoredPassage;

/// Sufficient iff at least `min_count` passages score `>= min_score`, and never with zero such
/// passages (a `min_count` of 0 behaves as 1). NaN scores never count.
pub fn decide(passages: &[ScoredPassage], min_score: f32, min_count: usize) -> bool {
    passages.iter().filter(|p| p.score >= min_score).count() >= min_count.max(1)
}

/// Retrieved passages with the gate's verdict attached. Downstream stages read `sufficient`
/// rather than re-deriving it.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub passages: Vec<ScoredPassage>,
    pub sufficient: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroundingGate {
    pub min_score: f32,
    pub min_count: usize,
    pub max_evidence_passages: usize,
}

impl GroundingGate {
    pub fn new(min_score: f32, min_count: usize, max_evidence_passages: usize) -> Self {
        Self {
            min_score,
            min_count,
            max_evidence_passages,
        }
    }

    pub fn evaluate(&self, passages: Vec<ScoredPassage>) -> RetrievalResult {
        let sufficient = decide(&passages, self.min_score, self.min_count);
        RetrievalResult {
            passages,
            sufficient,
        }
    }

    /// Passages that count as evidence, in retrieval order, capped at `max_evidence_passages`.
    /// Empty when the verdict was insufficient.
    pub fn accepted(&self, result: &RetrievalResult) -> Vec<ScoredPassage> {
        if !result.sufficient {
            return Vec::new();
        }
        result
            .passages
            .iter()
            .filter(|p| p.score >= self.min_score)
            .take(self.max_evidence_passages)
            .cloned()
            .collect()
    }
}
