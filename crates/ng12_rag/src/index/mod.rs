//! Immutable nearest-neighbour index over reference passages.
//!
//! Similarity is the inner product of L2-normalised vectors (cosine similarity). Passage
//! embeddings are normalised once at build time and query vectors at query time, so both sides
//! always use the same metric. The index never changes after [`VectorIndex::build`]; share it
//! behind an `Arc` and query it from any number of threads.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use ng12_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

pub mod similarity;
pub mod store;

pub use store::{load_index, save_index, IndexFile, IndexManifest};

/// A unit of reference text produced by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub chunk_id: String,
    pub page: u32,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    pub passage: Arc<Passage>,
    pub score: f32,
}

impl ScoredPassage {
    pub fn chunk_id(&self) -> &str {
        &self.passage.chunk_id
    }

    pub fn page(&self) -> u32 {
        self.passage.page
    }
}

/// Score descending, then lower page, then chunk_id ascending.
pub fn rank_order(a: &ScoredPassage, b: &ScoredPassage) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.passage.page.cmp(&b.passage.page))
        .then_with(|| a.passage.chunk_id.cmp(&b.passage.chunk_id))
}

#[derive(Debug)]
pub struct VectorIndex {
    passages: Vec<Arc<Passage>>,
    unit_vectors: Vec<Vec<f32>>,
    dims: usize,
}

impl VectorIndex {
    pub fn build(passages: Vec<Passage>) -> Result<Self, AppError> {
        if passages.is_empty() {
            return Err(build_error("Cannot build an index from zero passages"));
        }

        let dims = passages[0].embedding.len();
        if dims == 0 {
            return Err(build_error("Passage embeddings must not be empty")
                .with_details(format!("chunk_id={}", passages[0].chunk_id)));
        }

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut unit_vectors = Vec::with_capacity(passages.len());
        for p in passages.iter() {
            if !seen.insert(p.chunk_id.as_str()) {
                return Err(build_error("Duplicate chunk_id in passage set")
                    .with_details(format!("chunk_id={}", p.chunk_id)));
            }
            if p.page == 0 {
                return Err(build_error("Passage page numbers start at 1")
                    .with_details(format!("chunk_id={}", p.chunk_id)));
            }
            if p.embedding.len() != dims {
                return Err(build_error("Embedding dimension mismatch across passages")
                    .with_details(format!(
                        "expected={}; got={}; chunk_id={}",
                        dims,
                        p.embedding.len(),
                        p.chunk_id
                    )));
            }
            if p.embedding.iter().any(|x| !x.is_finite()) {
                return Err(build_error("Embedding contains non-finite values")
                    .with_details(format!("chunk_id={}", p.chunk_id)));
            }
            let unit = similarity::normalized(&p.embedding).ok_or_else(|| {
                build_error("Embedding norm is zero")
                    .with_details(format!("chunk_id={}", p.chunk_id))
            })?;
            unit_vectors.push(unit);
        }

        Ok(Self {
            passages: passages.into_iter().map(Arc::new).collect(),
            unit_vectors,
            dims,
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn passages(&self) -> impl Iterator<Item = &Passage> {
        self.passages.iter().map(|p| p.as_ref())
    }

    /// The `k` most similar passages, ranked by [`rank_order`]. Returns everything when the
    /// index holds fewer than `k` passages.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredPassage>, AppError> {
        if vector.len() != self.dims {
            return Err(AppError::new(
                codes::EMBEDDINGS_FAILED,
                "Query embedding dims do not match index dims",
            )
            .with_details(format!("index_dims={}; query_dims={}", self.dims, vector.len())));
        }
        let q = similarity::normalized(vector).ok_or_else(|| {
            AppError::new(codes::EMBEDDINGS_FAILED, "Query embedding norm is zero")
        })?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<ScoredPassage> = self
            .passages
            .iter()
            .zip(self.unit_vectors.iter())
            .map(|(p, v)| ScoredPassage {
                passage: Arc::clone(p),
                score: similarity::dot(&q, v),
            })
            .collect();

        hits.sort_by(rank_order);
        hits.truncate(k);
        Ok(hits)
    }
}

fn build_error(message: &str) -> AppError {
    AppError::new(codes::INDEX_BUILD_FAILED, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(id: &str, page: u32, v: Vec<f32>) -> Passage {
        Passage {
            chunk_id: id.to_string(),
            page,
            text: format!("text of {id}"),
            embedding: v,
        }
    }

    #[test]
    fn scores_are_cosine_regardless_of_vector_length() {
        let index = VectorIndex::build(vec![
            passage("a", 1, vec![10.0, 0.0]),
            passage("b", 1, vec![0.0, 0.5]),
        ])
        .expect("build");
        let hits = index.query(&[3.0, 0.0], 2).expect("query");
        assert_eq!(hits[0].chunk_id(), "a");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits[1].score.abs() < 1e-6);
    }

    #[test]
    fn query_rejects_zero_vector() {
        let index = VectorIndex::build(vec![passage("a", 1, vec![1.0, 0.0])]).expect("build");
        let err = index.query(&[0.0, 0.0], 1).expect_err("zero norm");
        assert_eq!(err.code, codes::EMBEDDINGS_FAILED);
    }
}
