use ng12_core::error::AppError;

/// Hosted reasoning service: prompt in, raw model text out. The output is untrusted; see
/// [`crate::reasoner`] for how it is parsed and cross-checked.
pub trait Llm: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, AppError>;
}

pub mod ollama_llm;
