// Vector index module
// Brute-force cosine similarity search over (document, vector) pairs

pub mod storage;


use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::documents::Document;
use crate::embeddings::Embedding;
use crate::{Result, RetrievalError};

/// A document together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub document: Document,
    pub vector: Embedding,
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document: Document,
    pub score: f32,
}

/// An immutable, ordered collection of [`IndexEntry`] values that all share
/// one vector dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    model: Option<String>,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from entries in document order.
    ///
    /// Every vector must have the same, non-zero length and only finite
    /// components. Document ids must equal their 0-based positions.
    #[inline]
    pub fn build(entries: Vec<IndexEntry>) -> Result<Self> {
        let dimension = match entries.first() {
            Some(entry) if !entry.vector.is_empty() => entry.vector.len(),
            _ => return Err(RetrievalError::EmptyIndex),
        };

        for (position, entry) in entries.iter().enumerate() {
            if entry.document.id != position {
                return Err(RetrievalError::InvalidArgument(format!(
                    "Entry at position {} has document id {}",
                    position, entry.document.id
                )));
            }
            if entry.vector.len() != dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: dimension,
                    actual: entry.vector.len(),
                });
            }
            if !entry.vector.iter().all(|x| x.is_finite()) {
                return Err(RetrievalError::InvalidArgument(format!(
                    "Vector for document {} has non-finite components",
                    entry.document.id
                )));
            }
        }

        debug!(
            "Built index with {} entries of dimension {}",
            entries.len(),
            dimension
        );

        Ok(Self {
            dimension,
            model: None,
            created_at: Utc::now(),
            entries,
        })
    }

    /// Record which embedding model produced the vectors.
    #[inline]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return up to `k` entries most similar to `query`, highest score first.
    /// Equal scores are ordered by ascending document id.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if !query.iter().all(|x| x.is_finite()) {
            return Err(RetrievalError::InvalidArgument(
                "Query vector has non-finite components".to_string(),
            ));
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine(query, &entry.vector), entry))
            .collect();

        let ranking = |a: &(f32, &IndexEntry), b: &(f32, &IndexEntry)| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.document.id.cmp(&b.1.document.id))
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k, ranking);
            scored.truncate(k);
        }
        scored.sort_by(ranking);

        debug!(
            "Search over {} entries returned {} results",
            self.entries.len(),
            scored.len()
        );

        Ok(scored
            .into_iter()
            .map(|(score, entry)| SearchHit {
                document: entry.document.clone(),
                score,
            })
            .collect())
    }
}

/// Cosine similarity of two vectors: their dot product divided by the
/// product of their magnitudes, or 0 when either magnitude is 0.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RetrievalError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(cosine(a, b))
}

// Accumulates in f64 so squared finite f32 components cannot overflow.
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
        (0.0_f64, 0.0_f64, 0.0_f64),
        |(dot, norm_a, norm_b), (&x, &y)| {
            let (x, y) = (f64::from(x), f64::from(y));
            (x.mul_add(y, dot), x.mul_add(x, norm_a), y.mul_add(y, norm_b))
        },
    );

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}
