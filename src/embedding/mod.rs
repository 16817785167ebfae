//! Embedding and relevance-rerank clients.

mod jina;

pub use jina::{JinaClient, JinaConfig};

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Abstract embedding + rerank provider.
///
/// `rerank` scores are returned aligned to the input document order, one
/// score per document.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Score documents for relevance against a query.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, EmbeddingError>;
}
