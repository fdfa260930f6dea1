use thiserror::Error;

use crate::config::ConfigError;
use crate::embeddings::EmbeddingError;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Cannot build an index from zero documents")]
    EmptyIndex,

    #[error("No index is loaded")]
    IndexNotLoaded,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat classification of a [`RetrievalError`], for callers that only need to
/// decide between retrying, re-authenticating and giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimited,
    Unavailable,
    ProviderError,
    DimensionMismatch,
    CorruptIndex,
    EmptyIndex,
    IndexNotLoaded,
    InvalidArgument,
    Ingest,
    Config,
    Io,
}

impl RetrievalError {
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Embedding(EmbeddingError::RateLimited { .. }) => ErrorKind::RateLimited,
            Self::Embedding(EmbeddingError::Unavailable(_)) => ErrorKind::Unavailable,
            Self::Embedding(EmbeddingError::Provider(_)) => ErrorKind::ProviderError,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::CorruptIndex(_) => ErrorKind::CorruptIndex,
            Self::EmptyIndex => ErrorKind::EmptyIndex,
            Self::IndexNotLoaded => ErrorKind::IndexNotLoaded,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Ingest(_) => ErrorKind::Ingest,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RateLimited => "rate limited",
            Self::Unavailable => "provider unavailable",
            Self::ProviderError => "provider error",
            Self::DimensionMismatch => "dimension mismatch",
            Self::CorruptIndex => "corrupt index",
            Self::EmptyIndex => "empty index",
            Self::IndexNotLoaded => "index not loaded",
            Self::InvalidArgument => "invalid argument",
            Self::Ingest => "ingest error",
            Self::Config => "configuration error",
            Self::Io => "io error",
        };
        f.write_str(name)
    }
}

pub mod commands;
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod engine;
pub mod index;
