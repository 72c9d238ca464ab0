//! RAG engine orchestration.
//!
//! One engine instance owns one in-memory vector index per domain. The index
//! is built lazily on first use and rebuilt wholesale on refresh; a build lock
//! guarantees at most one rebuild is in flight, and readers keep the previous
//! index until the new one is swapped in.

#[cfg(test)]
mod tests;

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::domains::Domain;
use crate::embeddings::Embedder;
use crate::index::{Document, VectorIndex};
use crate::query::StudentProfile;
use crate::store::RecordStore;

pub const DEFAULT_TOP_K: usize = 5;
const DEFAULT_BATCH_SIZE: usize = 16;

/// What a chat turn gets back from the engine. Always well-formed; the engine
/// degrades to the empty shape instead of surfacing errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagResponse<S> {
    pub relevant_docs: Vec<String>,
    pub sources: Vec<S>,
}

impl<S> RagResponse<S> {
    #[inline]
    pub fn empty() -> Self {
        Self {
            relevant_docs: Vec::new(),
            sources: Vec::new(),
        }
    }
}

/// Retrieval engine for one domain, constructed once at the composition root
/// and shared by reference.
pub struct RagEngine<D: Domain> {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    batch_size: usize,
    index: RwLock<Option<Arc<VectorIndex<D::Source>>>>,
    build_lock: Mutex<()>,
    _domain: PhantomData<fn() -> D>,
}

impl<D: Domain> RagEngine<D> {
    /// Create an engine. No background work starts here; the index is built
    /// on the first query or an explicit [`warm_up`](Self::warm_up).
    #[inline]
    pub fn new(store: Arc<dyn RecordStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            top_k: DEFAULT_TOP_K,
            batch_size: DEFAULT_BATCH_SIZE,
            index: RwLock::new(None),
            build_lock: Mutex::new(()),
            _domain: PhantomData,
        }
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[inline]
    pub async fn is_ready(&self) -> bool {
        self.index.read().await.is_some()
    }

    /// Build the index now instead of on the first query.
    #[inline]
    pub async fn warm_up(&self) -> Result<()> {
        self.ensure_initialized().await.map(|_| ())
    }

    /// Return the current index, building it first if none exists.
    ///
    /// Latecomers arriving during an in-flight build wait on the build lock
    /// and then pick up the finished index; the record store is only hit once
    /// per build.
    async fn ensure_initialized(&self) -> Result<Arc<VectorIndex<D::Source>>> {
        let existing = { self.index.read().await.clone() };
        if let Some(index) = existing {
            return Ok(index);
        }

        let _guard = self.build_lock.lock().await;

        // A concurrent caller may have finished the build while we waited
        let existing = { self.index.read().await.clone() };
        if let Some(index) = existing {
            return Ok(index);
        }

        info!("Initializing {} RAG engine", D::LABEL);
        let index = Arc::new(self.build_index().await?);
        info!(
            "{} RAG engine initialized with {} documents",
            D::LABEL,
            index.len()
        );

        *self.index.write().await = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Discard the current index and rebuild from a fresh full load.
    ///
    /// Readers of the old index are undisturbed; the new index is swapped in
    /// only once it is complete. On failure the old index stays in place.
    #[inline]
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.build_lock.lock().await;

        info!("Refreshing {} data from record store", D::LABEL);
        let index = Arc::new(self.build_index().await?);
        info!("Refreshed {} index: {} documents", D::LABEL, index.len());

        *self.index.write().await = Some(index);
        Ok(())
    }

    /// Answer a question with the top-k matching documents and their sources.
    ///
    /// Best-effort by contract: initialization, embedding, or search failures
    /// all collapse to the empty response so the chat path can fall back to
    /// non-RAG behavior.
    #[inline]
    pub async fn query(
        &self,
        question: &str,
        profile: Option<&StudentProfile>,
    ) -> RagResponse<D::Source> {
        let index = match self.ensure_initialized().await {
            Ok(index) => index,
            Err(e) => {
                error!("Failed to initialize {} RAG engine: {}", D::LABEL, e);
                return RagResponse::empty();
            }
        };

        if index.is_empty() {
            debug!("{} index has no documents, returning empty result", D::LABEL);
            return RagResponse::empty();
        }

        let enhanced = D::enhance_query(question, profile);
        debug!("Enhanced {} query: {}", D::LABEL, enhanced);

        let query_vector = match self.embedder.embed(&enhanced) {
            Ok(vector) => vector,
            Err(e) => {
                error!("Failed to embed {} query: {}", D::LABEL, e);
                return RagResponse::empty();
            }
        };

        let hits = index.search(&query_vector, self.top_k);
        debug!("Found {} matching {} documents", hits.len(), D::LABEL);

        RagResponse {
            relevant_docs: hits
                .iter()
                .map(|hit| hit.document.content.clone())
                .collect(),
            sources: hits.iter().map(|hit| hit.document.source.clone()).collect(),
        }
    }

    /// Write a record to the store, then rebuild the index over it.
    ///
    /// Returns `false` only when the write itself fails; a failed rebuild
    /// after a successful write is logged and retried on the next refresh.
    #[inline]
    pub async fn upsert_record(&self, record: &D::Record) -> bool {
        let row = match serde_json::to_value(record) {
            Ok(row) => row,
            Err(e) => {
                error!("Failed to serialize {} record: {}", D::LABEL, e);
                return false;
            }
        };

        if let Err(e) = self.store.upsert(D::TABLE, row, "id").await {
            error!("Failed to upsert {} record: {}", D::LABEL, e);
            return false;
        }

        if let Err(e) = self.refresh().await {
            warn!("Refresh after {} upsert failed: {}", D::LABEL, e);
        }

        true
    }

    /// Fetch one record straight from the store, bypassing the index.
    #[inline]
    pub async fn get_record(&self, id: &str) -> Option<D::Record> {
        match self.store.fetch_by_id(D::TABLE, id).await {
            Ok(Some(row)) => match serde_json::from_value(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    error!("Failed to parse {} record {}: {}", D::LABEL, id, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!("Failed to fetch {} record {}: {}", D::LABEL, id, e);
                None
            }
        }
    }

    async fn build_index(&self) -> Result<VectorIndex<D::Source>> {
        let documents = self.load_documents().await;
        VectorIndex::build(documents, self.embedder.as_ref(), self.batch_size)
    }

    /// Fetch every record and compile it into a document. Store failures and
    /// malformed rows degrade to a smaller (possibly empty) document set
    /// rather than failing initialization.
    async fn load_documents(&self) -> Vec<Document<D::Source>> {
        let rows = match self.store.fetch_all(D::TABLE).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("Failed to fetch {} records: {}", D::LABEL, e);
                return Vec::new();
            }
        };

        if rows.is_empty() {
            warn!("No {} records found in record store", D::LABEL);
            return Vec::new();
        }

        let total = rows.len();
        let mut documents = Vec::with_capacity(total);

        for row in rows {
            let record: D::Record = match serde_json::from_value(row) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping malformed {} row: {}", D::LABEL, e);
                    continue;
                }
            };

            match D::document(&record) {
                Some(document) => documents.push(document),
                None => {
                    warn!(
                        "Skipping {} record {:?} with blank content",
                        D::LABEL,
                        D::record_id(&record)
                    );
                }
            }
        }

        info!(
            "Loaded {} of {} {} records as documents",
            documents.len(),
            total,
            D::LABEL
        );
        documents
    }
}

pub type ScholarshipRag = RagEngine<crate::domains::ScholarshipDomain>;
pub type UniversityRag = RagEngine<crate::domains::UniversityDomain>;
