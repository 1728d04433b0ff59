use std::fs;
use std::path::Path;

use ng12_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use super::{Passage, VectorIndex};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexManifest {
    pub embedding_model: Option<String>,
    pub dims: u32,
    /// SHA-256 over chunk ids, pages and texts (chunk_id order).
    pub content_sha256: String,
}

/// On-disk shape written by ingestion and read at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub manifest: IndexManifest,
    pub passages: Vec<Passage>,
}

pub fn content_sha256<'a>(passages: impl IntoIterator<Item = &'a Passage>) -> String {
    let mut sorted: Vec<&Passage> = passages.into_iter().collect();
    sorted.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));

    let mut hasher = Sha256::new();
    for p in sorted {
        hasher.update(p.chunk_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(p.page.to_string().as_bytes());
        hasher.update(b"\n");
        hasher.update(p.text.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

/// Write the index atomically (tmp -> rename).
pub fn save_index(
    path: &Path,
    index: &VectorIndex,
    embedding_model: Option<&str>,
) -> Result<IndexManifest, AppError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| {
            AppError::new(codes::INDEX_BUILD_FAILED, "Failed to create index directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
    }

    let passages: Vec<Passage> = index.passages().cloned().collect();
    let manifest = IndexManifest {
        embedding_model: embedding_model.map(|m| m.to_string()),
        dims: index.dims() as u32,
        content_sha256: content_sha256(passages.iter()),
    };
    let file = IndexFile {
        manifest: manifest.clone(),
        passages,
    };

    let tmp = path.with_extension("tmp");
    let json = serde_json::to_vec(&file).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, "Failed to encode index file")
            .with_details(e.to_string())
    })?;
    fs::write(&tmp, json).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, "Failed to write index file")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, "Failed to finalize index file write")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })?;
    Ok(manifest)
}

/// Load and verify an index file. `expected_model` is the embedding model used at query time;
/// a manifest recorded with a different model is rejected.
pub fn load_index(path: &Path, expected_model: Option<&str>) -> Result<VectorIndex, AppError> {
    let bytes = fs::read(path).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, "Failed to read index file; run ingestion first")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    let file: IndexFile = serde_json::from_slice(&bytes).map_err(|e| {
        AppError::new(codes::INDEX_BUILD_FAILED, "Failed to decode index file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;

    if let (Some(expected), Some(recorded)) =
        (expected_model, file.manifest.embedding_model.as_deref())
    {
        if expected != recorded {
            return Err(AppError::new(
                codes::INDEX_BUILD_FAILED,
                "Index was built with a different embedding model",
            )
            .with_details(format!("index_model={recorded}; query_model={expected}")));
        }
    }

    let digest = content_sha256(file.passages.iter());
    if digest != file.manifest.content_sha256 {
        return Err(AppError::new(
            codes::INDEX_BUILD_FAILED,
            "Index content hash does not match manifest",
        )
        .with_details(format!(
            "expected={}; got={}",
            file.manifest.content_sha256, digest
        )));
    }

    let index = VectorIndex::build(file.passages)?;
    if index.dims() as u32 != file.manifest.dims {
        return Err(AppError::new(
            codes::INDEX_BUILD_FAILED,
            "Index dims do not match manifest",
        )
        .with_details(format!("manifest={}; got={}", file.manifest.dims, index.dims())));
    }

    info!(
        path = %path.display(),
        passages = index.len(),
        dims = index.dims(),
        "vector index loaded"
    );
    Ok(index)
}
