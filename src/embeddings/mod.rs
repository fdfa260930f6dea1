// Embeddings module
// Remote embedding provider access and the retry policy wrapped around it

pub mod client;
pub mod resilient;

use thiserror::Error;

pub use client::{HttpEmbeddingClient, ModelInfo};
pub use resilient::{ResilientEmbedder, RetryPolicy};

/// A dense embedding vector.
pub type Embedding = Vec<f32>;

/// Failure reported by an [`EmbeddingClient`], classified from the provider's
/// status code or the transport error, never from message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    /// The provider is throttling requests.
    #[error(
        "Embedding provider rate limited the request{}",
        .retry_after_secs.map(|secs| format!(" (retry after {secs}s)")).unwrap_or_default()
    )]
    RateLimited { retry_after_secs: Option<u64> },

    /// The provider could not be reached or is temporarily down.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),

    /// The provider rejected the request or answered with something unusable.
    #[error("Embedding provider error: {0}")]
    Provider(String),
}

/// A source of embeddings for batches of text.
///
/// Implementations make a single attempt per call; retrying is left to the
/// caller (see [`ResilientEmbedder`]).
pub trait EmbeddingClient {
    /// Model identifier the vectors come from.
    fn model(&self) -> &str;

    /// Largest number of texts accepted by one [`EmbeddingClient::embed`] call.
    fn max_batch_size(&self) -> usize;

    /// Embed `texts`, returning one vector per text in the same order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError>;
}

impl<T: EmbeddingClient + ?Sized> EmbeddingClient for &T {
    #[inline]
    fn model(&self) -> &str {
        (**self).model()
    }

    #[inline]
    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }

    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        (**self).embed(texts)
    }
}
