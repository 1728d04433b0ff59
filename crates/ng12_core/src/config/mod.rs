//! Engine configuration with layered resolution.
//!
//! Resolution order (highest priority first):
//! 1. Environment variables (`NG12_*`)
//! 2. TOML file passed to [`AppConfig::load`]
//! 3. Compiled defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{codes, AppError};

/// Retrieval and grounding policy values consumed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingConfig {
    /// Passages requested from the index per query.
    pub top_k: usize,
    /// Minimum similarity for a passage to count as evidence.
    pub min_score: f32,
    /// Passages at or above `min_score` needed before an answer is attempted.
    pub min_count: usize,
    /// Upper bound on citation excerpt length, in characters.
    pub max_excerpt_len: usize,
    /// Prior user turns folded into the retrieval query.
    pub conversation_window: usize,
    /// Accepted passages offered to the reasoning service.
    pub max_evidence_passages: usize,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: 0.75,
            min_count: 1,
            max_excerpt_len: 500,
            conversation_window: 3,
            max_evidence_passages: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub ollama_base_url: String,
    pub embedding_model: String,
    pub reasoning_model: String,
    pub embed_timeout_ms: u64,
    pub reasoner_timeout_ms: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://127.0.0.1:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            reasoning_model: "llama3.1".to_string(),
            embed_timeout_ms: 10_000,
            reasoner_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub index_path: PathBuf,
    pub patients_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("data/index/ng12_index.json"),
            patients_path: PathBuf::from("data/patients.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub grounding: GroundingConfig,
    pub services: ServicesConfig,
    pub data: DataConfig,
}

impl AppConfig {
    /// Defaults, then the optional TOML file, then `NG12_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(p) => {
                let raw = fs::read_to_string(p).map_err(|e| {
                    AppError::new("CONFIG_READ_FAILED", "Failed to read config file")
                        .with_details(format!("path={}; err={}", p.display(), e))
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, AppError> {
        toml::from_str(raw).map_err(|e| {
            AppError::new(codes::CONFIG_INVALID, "Failed to parse config TOML")
                .with_details(e.to_string())
        })
    }

    /// Apply `NG12_*` overrides read through `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let g = &mut self.grounding;
        if let Some(v) = lookup("NG12_TOP_K") {
            g.top_k = parse_env("NG12_TOP_K", &v)?;
        }
        if let Some(v) = lookup("NG12_MIN_SCORE") {
            g.min_score = parse_env("NG12_MIN_SCORE", &v)?;
        }
        if let Some(v) = lookup("NG12_MIN_COUNT") {
            g.min_count = parse_env("NG12_MIN_COUNT", &v)?;
        }
        if let Some(v) = lookup("NG12_MAX_EXCERPT_LEN") {
            g.max_excerpt_len = parse_env("NG12_MAX_EXCERPT_LEN", &v)?;
        }
        if let Some(v) = lookup("NG12_CONVERSATION_WINDOW") {
            g.conversation_window = parse_env("NG12_CONVERSATION_WINDOW", &v)?;
        }
        if let Some(v) = lookup("NG12_CHAT_TOP_CITATIONS") {
            g.max_evidence_passages = parse_env("NG12_CHAT_TOP_CITATIONS", &v)?;
        }

        let s = &mut self.services;
        if let Some(v) = lookup("NG12_MODEL") {
            s.reasoning_model = v;
        }
        if let Some(v) = lookup("NG12_EMBED_MODEL") {
            s.embedding_model = v;
        }
        if let Some(v) = lookup("NG12_OLLAMA_URL") {
            s.ollama_base_url = v;
        }

        if let Some(v) = lookup("NG12_INDEX_PATH") {
            self.data.index_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("NG12_PATIENTS_PATH") {
            self.data.patients_path = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.grounding.validate()?;
        if self.services.embed_timeout_ms == 0 || self.services.reasoner_timeout_ms == 0 {
            return Err(invalid("services.*_timeout_ms", "must be greater than zero"));
        }
        Ok(())
    }
}

impl GroundingConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        let g = self;
        if g.top_k == 0 {
            return Err(invalid("grounding.top_k", "must be at least 1"));
        }
        if g.min_count == 0 || g.min_count > g.top_k {
            return Err(invalid("grounding.min_count", "must be between 1 and top_k"));
        }
        if !g.min_score.is_finite() || !(-1.0..=1.0).contains(&g.min_score) {
            return Err(invalid("grounding.min_score", "must be between -1.0 and 1.0"));
        }
        if g.max_excerpt_len == 0 {
            return Err(invalid("grounding.max_excerpt_len", "must be at least 1"));
        }
        if g.max_evidence_passages < g.min_count {
            return Err(invalid(
                "grounding.max_evidence_passages",
                "must be at least min_count",
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, AppError> {
    raw.trim().parse::<T>().map_err(|_| {
        AppError::new(codes::CONFIG_INVALID, "Invalid environment override")
            .with_details(format!("var={name}; value={raw}"))
    })
}

fn invalid(field: &str, message: &str) -> AppError {
    AppError::new(codes::CONFIG_INVALID, "Invalid configuration value")
        .with_details(format!("field={field}; {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [grounding]
            min_score = 0.6
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.grounding.min_score, 0.6);
        assert_eq!(cfg.grounding.top_k, 10);
        assert_eq!(cfg.services.ollama_base_url, "http://127.0.0.1:11434");
        cfg.validate().expect("valid");
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut cfg = AppConfig::default();
        let env: HashMap<&str, &str> = [
            ("NG12_TOP_K", "4"),
            ("NG12_CHAT_TOP_CITATIONS", "2"),
            ("NG12_MODEL", "gemma2"),
        ]
        .into_iter()
        .collect();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(cfg.grounding.top_k, 4);
        assert_eq!(cfg.grounding.max_evidence_passages, 2);
        assert_eq!(cfg.services.reasoning_model, "gemma2");
    }

    #[test]
    fn unparseable_env_value_is_config_invalid() {
        let mut cfg = AppConfig::default();
        let err = cfg
            .apply_env_overrides(|k| (k == "NG12_MIN_SCORE").then(|| "high".to_string()))
            .expect_err("should fail");
        assert_eq!(err.code, codes::CONFIG_INVALID);
    }

    #[test]
    fn validate_rejects_min_count_above_top_k() {
        let mut cfg = AppConfig::default();
        cfg.grounding.top_k = 2;
        cfg.grounding.min_count = 3;
        assert_eq!(cfg.validate().expect_err("invalid").code, codes::CONFIG_INVALID);

        cfg.grounding.min_count = 1;
        cfg.grounding.min_score = f32::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn grounding_section_rejects_zero_min_count_on_its_own() {
        let g = GroundingConfig {
            min_count: 0,
            ..GroundingConfig::default()
        };
        let err = g.validate().expect_err("zero min_count");
        assert_eq!(err.code, codes::CONFIG_INVALID);
        assert!(err.details.unwrap_or_default().contains("grounding.min_count"));
        GroundingConfig::default().validate().expect("defaults are valid");
    }
}
