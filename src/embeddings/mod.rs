// Embeddings module
// Text-to-vector capability and its Ollama implementation

pub mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;

use crate::Result;

/// Turns text into a fixed-width vector. The same text and model always yield
/// the same vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Verifies the backing model can serve requests.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Text embedded for a post: title, then `". "`, then description.
#[inline]
pub fn compose_document_text(title: &str, description: &str) -> String {
    format!("{title}. {description}")
}
