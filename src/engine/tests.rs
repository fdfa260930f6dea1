use super::*;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

use crate::ErrorKind;
use crate::embeddings::{Embedding, RetryPolicy};

/// Deterministic client: known texts map to fixed vectors, anything else
/// gets a vector derived from its length. Individual calls can be made to fail.
struct StubClient {
    vectors: HashMap<String, Embedding>,
    failures: RefCell<HashMap<usize, EmbeddingError>>,
    calls: Cell<usize>,
    batch_sizes: RefCell<Vec<usize>>,
    max_batch: usize,
}

impl StubClient {
    fn new(vectors: &[(&str, Embedding)]) -> Self {
        Self {
            vectors: vectors
                .iter()
                .map(|(text, vector)| ((*text).to_string(), vector.clone()))
                .collect(),
            failures: RefCell::new(HashMap::new()),
            calls: Cell::new(0),
            batch_sizes: RefCell::new(Vec::new()),
            max_batch: 16,
        }
    }

    /// Make the `call`-th call (1-based) fail with `error`.
    fn fail_call(self, call: usize, error: EmbeddingError) -> Self {
        self.failures.borrow_mut().insert(call, error);
        self
    }

    fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }
}

impl EmbeddingClient for StubClient {
    fn model(&self) -> &str {
        "stub-model"
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Embedding>, EmbeddingError> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        self.batch_sizes.borrow_mut().push(texts.len());

        if let Some(error) = self.failures.borrow_mut().remove(&call) {
            return Err(error);
        }

        Ok(texts
            .iter()
            .map(|text| {
                self.vectors
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| vec![text.len() as f32, 1.0])
            })
            .collect())
    }
}

fn engine(client: StubClient) -> RetrievalEngine<StubClient> {
    RetrievalEngine::new(ResilientEmbedder::new(client, RetryPolicy::default()).with_sleep(|_| {}))
}

fn record(name: &str) -> RowRecord {
    RowRecord::new([("name", name)])
}

fn scenario_client() -> StubClient {
    StubClient::new(&[
        ("name: alpha", vec![1.0, 0.0]),
        ("name: beta", vec![0.0, 1.0]),
        ("name: gamma", vec![0.9, 0.1]),
        ("bakery", vec![1.0, 0.0]),
        ("three dimensional", vec![1.0, 0.0, 0.0]),
    ])
}

fn scenario_records() -> Vec<RowRecord> {
    vec![record("alpha"), record("beta"), record("gamma")]
}

fn ids(hits: &[SearchHit]) -> Vec<usize> {
    hits.iter().map(|hit| hit.document.id).collect()
}

#[test]
fn build_then_query_ranks_documents() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut engine = engine(scenario_client());

    engine
        .build(&scenario_records(), temp_dir.path().join("index.json"))
        .expect("build should succeed");

    let hits = engine.query("bakery", 2).expect("query should succeed");
    assert_eq!(ids(&hits), vec![0, 2]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!((hits[1].score - 0.994).abs() < 1e-3);
    assert_eq!(hits[0].document.content, "name: alpha");
}

#[test]
fn query_with_large_k_returns_all_documents() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut engine = engine(scenario_client());
    engine
        .build(&scenario_records(), temp_dir.path().join("index.json"))
        .expect("build should succeed");

    let hits = engine.query("bakery", 10).expect("query should succeed");
    assert_eq!(ids(&hits), vec![0, 2, 1]);
}

#[test]
fn query_dimension_mismatch() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut engine = engine(scenario_client());
    engine
        .build(&scenario_records(), temp_dir.path().join("index.json"))
        .expect("build should succeed");

    let result = engine.query("three dimensional", 2);
    assert!(matches!(
        result,
        Err(RetrievalError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
}

#[test]
fn build_persists_loadable_index() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let path = temp_dir.path().join("index.json");
    let mut engine = engine(scenario_client());

    let built = engine
        .build(&scenario_records(), &path)
        .expect("build should succeed")
        .clone();

    let loaded = VectorIndex::load(&path).expect("load should succeed");
    assert_eq!(loaded, built);
    assert_eq!(loaded.model(), Some("stub-model"));
}

#[test]
fn builds_are_idempotent() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut first = engine(scenario_client());
    let mut second = engine(scenario_client());

    let a = first
        .build(&scenario_records(), temp_dir.path().join("a.json"))
        .expect("build should succeed")
        .entries()
        .to_vec();
    let b = second
        .build(&scenario_records(), temp_dir.path().join("b.json"))
        .expect("build should succeed")
        .entries()
        .to_vec();

    assert_eq!(a, b);
}

#[test]
fn build_respects_batch_size() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let records: Vec<RowRecord> = ["a", "b", "c", "d", "e"].iter().map(|n| record(n)).collect();
    let mut engine = engine(StubClient::new(&[]).with_max_batch(2));

    let index = engine
        .build(&records, temp_dir.path().join("index.json"))
        .expect("build should succeed");

    assert_eq!(index.len(), 5);
    let order: Vec<usize> = index.entries().iter().map(|e| e.document.id).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
    assert_eq!(
        *engine.embedder().client().batch_sizes.borrow(),
        vec![2, 2, 1]
    );
}

#[test]
fn batch_size_is_capped_by_client() {
    let engine = engine(StubClient::new(&[]).with_max_batch(4));
    assert_eq!(engine.batch_size(), 4);

    let engine = engine.with_batch_size(100);
    assert_eq!(engine.batch_size(), 4);

    let engine = engine.with_batch_size(0);
    assert_eq!(engine.batch_size(), 1);

    let engine = engine.with_batch_size(3);
    assert_eq!(engine.batch_size(), 3);
}

#[test]
fn rate_limited_batch_is_retried_during_build() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let client = scenario_client().fail_call(
        1,
        EmbeddingError::RateLimited {
            retry_after_secs: None,
        },
    );
    let mut engine = engine(client);

    engine
        .build(&scenario_records(), temp_dir.path().join("index.json"))
        .expect("build should succeed after retry");

    assert_eq!(engine.embedder().client().calls.get(), 2);
}

#[test]
fn terminal_failure_aborts_build_without_writing() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let path = temp_dir.path().join("index.json");
    let client = StubClient::new(&[])
        .with_max_batch(1)
        .fail_call(2, EmbeddingError::Provider("denied".to_string()));
    let mut engine = engine(client);

    let result = engine.build(&scenario_records(), &path);

    assert!(matches!(
        result.map(|_| ()).map_err(|e| e.kind()),
        Err(ErrorKind::ProviderError)
    ));
    assert!(!path.exists());
    assert!(engine.index().is_none());
    assert_eq!(fs::read_dir(temp_dir.path()).map(Iterator::count).unwrap_or(0), 0);
}

#[test]
fn exhausted_retries_abort_build_with_rate_limited() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let path = temp_dir.path().join("index.json");
    let limited = || EmbeddingError::RateLimited {
        retry_after_secs: None,
    };
    let client = StubClient::new(&[])
        .fail_call(1, limited())
        .fail_call(2, limited())
        .fail_call(3, limited());
    let mut engine = engine(client);

    let result = engine.build(&scenario_records(), &path);

    assert!(matches!(
        result.map(|_| ()).map_err(|e| e.kind()),
        Err(ErrorKind::RateLimited)
    ));
    assert_eq!(engine.embedder().client().calls.get(), 3);
    assert!(!path.exists());
}

#[test]
fn failed_rebuild_keeps_previous_index() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let path = temp_dir.path().join("index.json");
    let client = scenario_client().fail_call(2, EmbeddingError::Provider("denied".to_string()));
    let mut engine = engine(client);

    engine
        .build(&scenario_records(), &path)
        .expect("first build should succeed");
    let before = VectorIndex::load(&path).expect("load should succeed");

    assert!(engine.build(&[record("delta")], &path).is_err());

    assert_eq!(VectorIndex::load(&path).expect("load should succeed"), before);
    assert_eq!(engine.index().map(VectorIndex::len), Some(3));
}

#[test]
fn build_from_no_records_fails() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut engine = engine(scenario_client());

    let result = engine.build(&[], temp_dir.path().join("index.json"));
    assert!(matches!(result, Err(RetrievalError::EmptyIndex)));
    assert_eq!(engine.embedder().client().calls.get(), 0);
}

#[test]
fn query_without_index() {
    let engine = engine(scenario_client());
    assert!(matches!(
        engine.query("bakery", 3),
        Err(RetrievalError::IndexNotLoaded)
    ));
}

#[test]
fn query_rejects_zero_k_before_embedding() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut engine = engine(scenario_client());
    engine
        .build(&scenario_records(), temp_dir.path().join("index.json"))
        .expect("build should succeed");
    let calls = engine.embedder().client().calls.get();

    assert!(matches!(
        engine.query("bakery", 0),
        Err(RetrievalError::InvalidArgument(_))
    ));
    assert_eq!(engine.embedder().client().calls.get(), calls);
}

#[test]
fn failed_query_leaves_index_usable() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let client = scenario_client().fail_call(2, EmbeddingError::Provider("denied".to_string()));
    let mut engine = engine(client);
    engine
        .build(&scenario_records(), temp_dir.path().join("index.json"))
        .expect("build should succeed");

    let failed = engine.query("bakery", 2);
    assert!(matches!(
        failed.map_err(|e| e.kind()),
        Err(ErrorKind::ProviderError)
    ));

    let hits = engine.query("bakery", 2).expect("next query should succeed");
    assert_eq!(ids(&hits), vec![0, 2]);
}

#[test]
fn query_retries_rate_limits() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let client = scenario_client().fail_call(
        2,
        EmbeddingError::RateLimited {
            retry_after_secs: None,
        },
    );
    let mut engine = engine(client);
    engine
        .build(&scenario_records(), temp_dir.path().join("index.json"))
        .expect("build should succeed");

    let hits = engine.query("bakery", 1).expect("query should succeed");
    assert_eq!(ids(&hits), vec![0]);
    assert_eq!(engine.embedder().client().calls.get(), 3);
}

#[test]
fn load_index_replaces_current_index() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let path = temp_dir.path().join("index.json");

    let mut builder = engine(scenario_client());
    builder
        .build(&scenario_records(), &path)
        .expect("build should succeed");

    let mut server = engine(scenario_client());
    assert!(server.index().is_none());
    server.load_index(&path).expect("load should succeed");

    let hits = server.query("bakery", 2).expect("query should succeed");
    assert_eq!(ids(&hits), vec![0, 2]);
}

#[test]
fn load_corrupt_index_keeps_current_index() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let good = temp_dir.path().join("index.json");
    let bad = temp_dir.path().join("bad.json");
    fs::write(&bad, "{}").expect("should write file");

    let mut engine = engine(scenario_client());
    engine
        .build(&scenario_records(), &good)
        .expect("build should succeed");

    let result = engine.load_index(&bad).map(|_| ()).map_err(|e| e.kind());
    assert_eq!(result, Err(ErrorKind::CorruptIndex));
    assert_eq!(engine.index().map(VectorIndex::len), Some(3));
}
