use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape used across the engine, its adapters and the service facade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(details) = &self.details {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

/// Error codes shared between crates. Codes that only one module raises stay inline there.
pub mod codes {
    pub const INDEX_BUILD_FAILED: &str = "INDEX_BUILD_FAILED";
    pub const EMBEDDINGS_FAILED: &str = "AI_EMBEDDINGS_FAILED";
    pub const REASONER_TIMEOUT: &str = "AI_REASONER_TIMEOUT";
    pub const REASONER_FAILED: &str = "AI_REASONER_FAILED";
    pub const GROUNDING_VIOLATION: &str = "AI_GROUNDING_VIOLATION";
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
    pub const PATIENT_NOT_FOUND: &str = "PATIENT_NOT_FOUND";
    pub const CONVERSATION_STORE_FAILED: &str = "CONVERSATION_STORE_FAILED";
}
