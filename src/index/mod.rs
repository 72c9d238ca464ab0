//! In-memory vector index over embedded documents.
//!
//! The index is rebuilt wholesale on every refresh rather than patched in
//! place; the engine swaps the finished index in atomically so readers never
//! observe a half-built one.


use tracing::{debug, warn};

use crate::embeddings::Embedder;
use crate::{RagError, Result};

/// The unit of retrieval: normalized text plus typed source metadata.
///
/// The source is pass-through data for the caller; the index never interprets
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document<S> {
    pub content: String,
    pub source: S,
}

/// A single search hit, borrowed from the index.
#[derive(Debug)]
pub struct SearchHit<'a, S> {
    pub document: &'a Document<S>,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct IndexEntry<S> {
    vector: Vec<f32>,
    document: Document<S>,
}

/// An append-once collection of (vector, document) pairs supporting
/// nearest-neighbor search by cosine similarity.
#[derive(Debug, Clone)]
pub struct VectorIndex<S> {
    entries: Vec<IndexEntry<S>>,
    dimension: Option<usize>,
}

impl<S> VectorIndex<S> {
    /// Create an index over zero documents. Searching it returns no hits.
    #[inline]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            dimension: None,
        }
    }

    /// Embed all documents and build the index.
    ///
    /// Embedding runs in bounded sequential batches of `batch_size`. Any
    /// embedding failure fails the whole build; a partially embedded corpus is
    /// never returned, and zero vectors are never substituted for failed
    /// documents.
    #[inline]
    pub fn build(
        documents: Vec<Document<S>>,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self> {
        if documents.is_empty() {
            debug!("No documents to index");
            return Ok(Self::empty());
        }

        let texts: Vec<String> = documents.iter().map(|doc| doc.content.clone()).collect();
        let batch_size = batch_size.max(1);

        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size) {
            let batch = embedder.embed_batch(chunk)?;
            if batch.len() != chunk.len() {
                return Err(RagError::Embedding(format!(
                    "Mismatch between request and response counts: {} vs {}",
                    chunk.len(),
                    batch.len()
                )));
            }
            vectors.extend(batch);
        }

        let dimension = vectors.first().map(Vec::len);
        if let Some(dim) = dimension {
            if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
                return Err(RagError::Embedding(format!(
                    "Inconsistent embedding dimensions: expected {}, got {}",
                    dim,
                    bad.len()
                )));
            }
        }

        let entries = vectors
            .into_iter()
            .zip(documents)
            .map(|(vector, document)| IndexEntry { vector, document })
            .collect::<Vec<_>>();

        debug!(
            "Built vector index with {} entries ({} dimensions)",
            entries.len(),
            dimension.unwrap_or(0)
        );

        Ok(Self { entries, dimension })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return up to `k` documents closest to the query vector, descending by
    /// cosine similarity. Ties keep insertion order.
    ///
    /// No minimum-similarity floor is applied; callers decide relevance
    /// cutoffs. Searching an empty index returns an empty vec.
    #[inline]
    pub fn search(&self, query_vector: &[f32], k: usize) -> Vec<SearchHit<'_, S>> {
        if self.entries.is_empty() || k == 0 {
            return Vec::new();
        }

        if self.dimension.is_some_and(|dim| dim != query_vector.len()) {
            warn!(
                "Query vector dimension {} does not match index dimension {:?}",
                query_vector.len(),
                self.dimension
            );
            return Vec::new();
        }

        let mut hits: Vec<SearchHit<'_, S>> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                document: &entry.document,
                score: cosine_similarity(&entry.vector, query_vector),
            })
            .collect();

        // sort_by is stable, so equal scores keep insertion order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        hits
    }
}

/// Cosine similarity in [-1, 1]; zero vectors score 0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot = x.mul_add(*y, dot);
        norm_a = x.mul_add(*x, norm_a);
        norm_b = y.mul_add(*y, norm_b);
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}
