use ng12_core::error::AppError;

/// Maps text to a vector. Implementations must be usable from concurrent requests.
pub trait Embedder: Send + Sync {
    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError>;
}

impl<F> Embedder for F
where
    F: Fn(&str) -> Result<Vec<f32>, AppError> + Send + Sync,
{
    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        self(input)
    }
}

pub mod ollama_embed;
