// Retrieval engine
// Builds the index from row records and answers top-k queries against it

#[cfg(test)]
mod tests;

use std::path::Path;

use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::documents::{Document, RowRecord, build_documents};
use crate::embeddings::{Embedding, EmbeddingClient, EmbeddingError, ResilientEmbedder};
use crate::index::{IndexEntry, SearchHit, VectorIndex};
use crate::{Result, RetrievalError};

/// Orchestrates documents, embeddings and the vector index.
///
/// The engine owns at most one loaded [`VectorIndex`]. A successful build or
/// load replaces it wholesale; a failed one leaves the current index in place.
pub struct RetrievalEngine<C> {
    embedder: ResilientEmbedder<C>,
    batch_size: usize,
    index: Option<VectorIndex>,
    progress: ProgressBar,
}

impl<C: EmbeddingClient> RetrievalEngine<C> {
    #[inline]
    pub fn new(embedder: ResilientEmbedder<C>) -> Self {
        let batch_size = embedder.client().max_batch_size().max(1);
        Self {
            embedder,
            batch_size,
            index: None,
            progress: ProgressBar::hidden(),
        }
    }

    /// Use smaller batches than the client allows.
    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        let limit = self.embedder.client().max_batch_size().max(1);
        self.batch_size = batch_size.clamp(1, limit);
        self
    }

    /// Report embedding progress (in documents) on `progress`.
    #[inline]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    #[inline]
    pub fn with_index(mut self, index: VectorIndex) -> Self {
        self.index = Some(index);
        self
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn embedder(&self) -> &ResilientEmbedder<C> {
        &self.embedder
    }

    #[inline]
    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    /// Load a persisted index and make it the one queries run against.
    #[inline]
    pub fn load_index<P: AsRef<Path>>(&mut self, path: P) -> Result<&VectorIndex> {
        let index = VectorIndex::load(path)?;

        let model = self.embedder.client().model();
        match index.model() {
            Some(stored) if stored != model => warn!(
                "Index was built with model '{}' but queries use '{}'",
                stored, model
            ),
            _ => {}
        }

        Ok(self.index.insert(index))
    }

    /// Build an index from `records`, persist it to `destination` and make
    /// it the loaded index.
    ///
    /// Nothing is written unless every batch embeds successfully.
    #[inline]
    pub fn build<P: AsRef<Path>>(
        &mut self,
        records: &[RowRecord],
        destination: P,
    ) -> Result<&VectorIndex> {
        if records.is_empty() {
            return Err(RetrievalError::EmptyIndex);
        }

        let documents = build_documents(records);
        info!(
            "Embedding {} documents in batches of {}",
            documents.len(),
            self.batch_size
        );

        let entries = self.embed_documents(documents)?;
        let index = VectorIndex::build(entries)?.with_model(self.embedder.client().model());
        index.save(destination.as_ref())?;

        info!(
            "Built index with {} entries of dimension {}",
            index.len(),
            index.dimension()
        );
        Ok(self.index.insert(index))
    }

    /// Embed documents batch by batch, pairing each vector with its document.
    #[inline]
    pub fn embed_documents(&self, documents: Vec<Document>) -> Result<Vec<IndexEntry>> {
        self.progress.set_length(documents.len() as u64);
        self.progress.set_position(0);

        let mut entries = Vec::with_capacity(documents.len());
        let mut pending = documents.into_iter().peekable();

        while pending.peek().is_some() {
            let batch: Vec<Document> = pending.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();

            debug!(
                "Embedding batch starting at document {}",
                batch.first().map_or(0, |d| d.id)
            );

            let vectors = match self.embedder.embed(&texts) {
                Ok(vectors) => vectors,
                Err(e) => {
                    self.progress.abandon();
                    return Err(e.into());
                }
            };

            if vectors.len() != batch.len() {
                self.progress.abandon();
                return Err(EmbeddingError::Provider(format!(
                    "Expected {} vectors, received {}",
                    batch.len(),
                    vectors.len()
                ))
                .into());
            }

            self.progress.inc(batch.len() as u64);
            entries.extend(
                batch
                    .into_iter()
                    .zip(vectors)
                    .map(|(document, vector)| IndexEntry { document, vector }),
            );
        }

        self.progress.finish();
        Ok(entries)
    }

    /// Embed `text` and return the `k` most similar documents.
    #[inline]
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(RetrievalError::InvalidArgument(
                "k must be greater than zero".to_string(),
            ));
        }

        let index = self.index.as_ref().ok_or(RetrievalError::IndexNotLoaded)?;

        debug!("Embedding query ({} characters)", text.len());
        let vectors = self.embedder.embed(&[text.to_string()])?;
        let [query_vector]: [Embedding; 1] =
            vectors.try_into().map_err(|vectors: Vec<Embedding>| {
                EmbeddingError::Provider(format!(
                    "Expected exactly one vector for the query, received {}",
                    vectors.len()
                ))
            })?;

        index.search(&query_vector, k)
    }
}
