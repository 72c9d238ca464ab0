use super::*;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::RagError;
use crate::domains::Scholarship;

/// In-memory record store with call counting.
struct StubStore {
    rows: StdMutex<Vec<Value>>,
    fetch_calls: AtomicUsize,
    fail_fetch: bool,
    fail_upsert: bool,
}

impl StubStore {
    fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows: StdMutex::new(rows),
            fetch_calls: AtomicUsize::new(0),
            fail_fetch: false,
            fail_upsert: false,
        }
    }

    fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for StubStore {
    async fn fetch_all(&self, _table: &str) -> crate::Result<Vec<Value>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch {
            return Err(RagError::Store("store unreachable".to_string()));
        }
        Ok(self.rows.lock().expect("rows lock").clone())
    }

    async fn fetch_by_id(&self, _table: &str, id: &str) -> crate::Result<Option<Value>> {
        if self.fail_fetch {
            return Err(RagError::Store("store unreachable".to_string()));
        }
        Ok(self
            .rows
            .lock()
            .expect("rows lock")
            .iter()
            .find(|row| row["id"] == id)
            .cloned())
    }

    async fn upsert(&self, _table: &str, row: Value, _conflict_key: &str) -> crate::Result<()> {
        if self.fail_upsert {
            return Err(RagError::Store("write rejected".to_string()));
        }
        self.rows.lock().expect("rows lock").push(row);
        Ok(())
    }
}

/// Deterministic embedder scoring texts by vocabulary term counts.
struct VocabEmbedder;

const VOCAB: &[&str] = &["dost", "eligibility", "ched", "tuition", "merit", "stipend"];

impl Embedder for VocabEmbedder {
    fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        Ok(VOCAB
            .iter()
            .map(|term| lowered.matches(term).count() as f32)
            .collect())
    }

    fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Embedder that fails its first `failures` batch calls, then recovers.
struct FlakyEmbedder {
    failures: AtomicUsize,
}

impl Embedder for FlakyEmbedder {
    fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
        VocabEmbedder.embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(RagError::Embedding("provider down".to_string()));
        }
        VocabEmbedder.embed_batch(texts)
    }
}

/// Embedder that indexes fine but fails every query-time embedding.
struct QueryFailEmbedder;

impl Embedder for QueryFailEmbedder {
    fn embed(&self, _text: &str) -> crate::Result<Vec<f32>> {
        Err(RagError::Embedding("provider down".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        VocabEmbedder.embed_batch(texts)
    }
}

fn scholarship_rows() -> Vec<Value> {
    vec![
        json!({
            "id": "s-1",
            "title": "DOST Scholarship",
            "eligibility": "top 5% of class",
        }),
        json!({
            "id": "s-2",
            "title": "CHED Merit Scholarship",
            "benefits": "tuition subsidy",
        }),
        json!({
            "id": "s-3",
            "title": "Metrobank Scholarship",
            "benefits": "monthly stipend",
        }),
    ]
}

fn engine_with(store: StubStore, embedder: impl Embedder + 'static) -> ScholarshipRag {
    RagEngine::new(Arc::new(store), Arc::new(embedder))
}

/// Build an engine while keeping a handle on the stub store for assertions.
fn engine_and_store(
    store: StubStore,
    embedder: impl Embedder + 'static,
) -> (ScholarshipRag, Arc<StubStore>) {
    let store = Arc::new(store);
    let engine = RagEngine::new(Arc::clone(&store) as Arc<dyn RecordStore>, Arc::new(embedder));
    (engine, store)
}

#[tokio::test]
async fn empty_store_yields_empty_response() {
    let engine = engine_with(StubStore::with_rows(Vec::new()), VocabEmbedder);

    let response = engine.query("any question", None).await;

    assert_eq!(response, RagResponse::empty());
    // zero documents is a valid Ready state, not an initialization failure
    assert!(engine.is_ready().await);
}

#[tokio::test]
async fn unreachable_store_degrades_to_empty_response() {
    let mut store = StubStore::with_rows(scholarship_rows());
    store.fail_fetch = true;
    let engine = engine_with(store, VocabEmbedder);

    let response = engine.query("DOST eligibility", None).await;

    assert_eq!(response, RagResponse::empty());
    assert!(engine.is_ready().await);
}

#[tokio::test]
async fn query_retrieves_matching_document_first() {
    let engine = engine_with(StubStore::with_rows(scholarship_rows()), VocabEmbedder);

    let response = engine.query("DOST eligibility requirements", None).await;

    assert_eq!(response.relevant_docs.len(), 3);
    assert!(response.relevant_docs[0].contains("DOST Scholarship"));
    assert_eq!(response.sources[0].id, "s-1");
}

#[tokio::test]
async fn top_k_limits_results() {
    let engine =
        engine_with(StubStore::with_rows(scholarship_rows()), VocabEmbedder).with_top_k(2);

    let response = engine.query("scholarship tuition", None).await;

    assert_eq!(response.relevant_docs.len(), 2);
    assert_eq!(response.sources.len(), 2);
}

#[tokio::test]
async fn embedding_failure_leaves_engine_retryable() {
    let embedder = FlakyEmbedder {
        failures: AtomicUsize::new(1),
    };
    let engine = engine_with(StubStore::with_rows(scholarship_rows()), embedder);

    let first = engine.query("DOST eligibility", None).await;
    assert_eq!(first, RagResponse::empty());
    assert!(!engine.is_ready().await);

    // provider recovered; the next query retries initialization
    let second = engine.query("DOST eligibility", None).await;
    assert_eq!(second.relevant_docs.len(), 3);
    assert!(engine.is_ready().await);
}

#[tokio::test]
async fn query_time_embedding_failure_returns_empty_shape() {
    let engine = engine_with(StubStore::with_rows(scholarship_rows()), QueryFailEmbedder);

    let response = engine.query("DOST eligibility", None).await;

    assert_eq!(response, RagResponse::empty());
    assert!(engine.is_ready().await);
}

#[tokio::test]
async fn concurrent_queries_share_one_initialization() {
    let (engine, store) = engine_and_store(StubStore::with_rows(scholarship_rows()), VocabEmbedder);
    let engine = Arc::new(engine);

    let first = Arc::clone(&engine);
    let second = Arc::clone(&engine);
    let (a, b) = tokio::join!(
        async move { first.query("DOST eligibility", None).await },
        async move { second.query("CHED tuition", None).await },
    );

    assert!(!a.relevant_docs.is_empty());
    assert!(!b.relevant_docs.is_empty());
    assert_eq!(store.fetch_count(), 1);
}

#[tokio::test]
async fn refresh_picks_up_new_records() {
    let store = StubStore::with_rows(scholarship_rows());
    let engine = engine_with(store, VocabEmbedder).with_top_k(10);

    let before = engine.query("scholarship", None).await;
    assert_eq!(before.relevant_docs.len(), 3);

    let added = Scholarship {
        id: Some("s-4".to_string()),
        title: Some("GSIS Scholarship".to_string()),
        ..Scholarship::default()
    };
    assert!(engine.upsert_record(&added).await);

    let after = engine.query("scholarship", None).await;
    assert_eq!(after.relevant_docs.len(), 4);
}

#[tokio::test]
async fn refresh_is_idempotent_on_unchanged_data() {
    let engine = engine_with(StubStore::with_rows(scholarship_rows()), VocabEmbedder);

    engine.refresh().await.expect("first refresh succeeds");
    let first = engine.query("DOST eligibility", None).await;

    engine.refresh().await.expect("second refresh succeeds");
    let second = engine.query("DOST eligibility", None).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn upsert_failure_returns_false_without_refresh() {
    let mut stub = StubStore::with_rows(scholarship_rows());
    stub.fail_upsert = true;
    let (engine, store) = engine_and_store(stub, VocabEmbedder);

    let record = Scholarship {
        id: Some("s-9".to_string()),
        title: Some("Rejected".to_string()),
        ..Scholarship::default()
    };

    assert!(!engine.upsert_record(&record).await);
    assert_eq!(store.fetch_count(), 0);
}

#[tokio::test]
async fn blank_records_never_reach_the_index() {
    let mut rows = scholarship_rows();
    rows.push(json!({"id": "s-blank"}));
    let engine = engine_with(StubStore::with_rows(rows), VocabEmbedder).with_top_k(10);

    let response = engine.query("scholarship", None).await;

    assert_eq!(response.relevant_docs.len(), 3);
}

#[tokio::test]
async fn get_record_fetches_by_id() {
    let engine = engine_with(StubStore::with_rows(scholarship_rows()), VocabEmbedder);

    let record = engine.get_record("s-2").await.expect("record exists");
    assert_eq!(record.title.as_deref(), Some("CHED Merit Scholarship"));

    assert!(engine.get_record("missing").await.is_none());
}
