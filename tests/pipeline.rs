//! Ingestion and retrieval against the in-memory store with a deterministic
//! bag-of-words embedder.

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

use topic_rag::chunk::TextSplitter;
use topic_rag::embedding::Embedder;
use topic_rag::error::{EmbeddingError, StoreError};
use topic_rag::ingest::{IngestionPipeline, PROGRESS_TITLE};
use topic_rag::models::{NewDocument, StoredDocument, Topic, TopicStats};
use topic_rag::progress::{ChannelProgress, ProgressEvent, ProgressMonitor};
use topic_rag::retrieve::RetrievalEngine;
use topic_rag::store::memory::InMemoryStore;
use topic_rag::store::{IndexStore, IndexTransaction};

const DIMS: usize = 256;

/// Hashes lowercase words into a fixed-size, L2-normalized vector.
/// Any text containing `FAIL` is rejected like a server error.
struct BagOfWords;

fn word_slot(word: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

fn embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text.split_whitespace() {
        let word: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(|c| c.to_lowercase())
            .collect();
        if !word.is_empty() {
            v[word_slot(&word)] += 1.0;
        }
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[async_trait]
impl Embedder for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| t.contains("FAIL")) {
            return Err(EmbeddingError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(texts.iter().map(|t| embed(t)).collect())
    }
}

struct Harness {
    store: InMemoryStore,
    pipeline: IngestionPipeline,
    engine: RetrievalEngine,
}

fn harness() -> Harness {
    harness_with(|p| p)
}

fn harness_with(configure: impl FnOnce(IngestionPipeline) -> IngestionPipeline) -> Harness {
    let store = InMemoryStore::new();
    let shared: Arc<dyn IndexStore> = Arc::new(store.clone());
    let embedder: Arc<dyn Embedder> = Arc::new(BagOfWords);
    Harness {
        pipeline: configure(IngestionPipeline::new(shared.clone(), embedder.clone())),
        engine: RetrievalEngine::new(shared, embedder),
        store,
    }
}

fn write_scenario(dir: &Path) {
    fs::write(dir.join("a.txt"), "content of a: apples and avocados").unwrap();
    fs::write(dir.join("b.txt"), "unrelated bananas and blueberries").unwrap();
    fs::write(dir.join("binary.bin"), b"\x00\x01\x02binary\x00data").unwrap();
}

#[tokio::test]
async fn three_file_scenario() {
    let tmp = TempDir::new().unwrap();
    write_scenario(tmp.path());
    let topic = Topic::directory("docs", tmp.path());
    let h = harness();

    let monitor = ProgressMonitor::silent();
    let summary = h.pipeline.run(&[topic], &monitor).await;

    assert_eq!(summary.files, 3);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.skipped, 1);
    assert!(summary.errors.is_empty(), "errors: {:?}", summary.errors);

    let paths: Vec<String> = h.store.documents().into_iter().map(|d| d.path).collect();
    assert_eq!(paths.len(), 2);
    assert!(paths.contains(&"a.txt".to_string()));
    assert!(paths.contains(&"b.txt".to_string()));

    let hits = h
        .engine
        .retrieve("content of a", &["docs".to_string()], 5)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].contains("apples"), "first hit: {}", hits[0]);
}

#[tokio::test]
async fn progress_is_reported_per_file() {
    let tmp = TempDir::new().unwrap();
    write_scenario(tmp.path());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let monitor = ProgressMonitor::new(Box::new(ChannelProgress::new(tx)));

    harness()
        .pipeline
        .run(&[Topic::directory("docs", tmp.path())], &monitor)
        .await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.title, PROGRESS_TITLE);
    assert_eq!(snapshot.total_pending, 3);
    assert_eq!(snapshot.completed, 3);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let advances = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Advanced { .. }))
        .count();
    assert_eq!(advances, 3);
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Finished {
            completed: 3,
            errors: 0
        })
    );
}

#[tokio::test]
async fn reingesting_unchanged_files_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    write_scenario(tmp.path());
    let topic = Topic::directory("docs", tmp.path());
    let h = harness();

    let first = h.pipeline.run(&[topic.clone()], &ProgressMonitor::silent()).await;
    let docs_after_first = h.store.documents();
    let embeddings_after_first = h.store.embedding_count();

    let second = h.pipeline.run(&[topic], &ProgressMonitor::silent()).await;
    assert_eq!(first.created, 2);
    assert_eq!(second.created, 0);
    assert_eq!(second.refreshed, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(h.store.documents(), docs_after_first);
    assert_eq!(h.store.embedding_count(), embeddings_after_first);
}

#[tokio::test]
async fn changed_file_is_refreshed() {
    let tmp = TempDir::new().unwrap();
    write_scenario(tmp.path());
    let topic = Topic::directory("docs", tmp.path());
    let h = harness();
    h.pipeline.run(&[topic.clone()], &ProgressMonitor::silent()).await;

    fs::write(tmp.path().join("a.txt"), "content of a: now about apricots").unwrap();
    let summary = h.pipeline.run(&[topic], &ProgressMonitor::silent()).await;
    assert_eq!(summary.refreshed, 1);
    assert_eq!(summary.created, 0);

    let docs = h.store.documents();
    assert_eq!(docs.len(), 2);
    let a = docs.iter().find(|d| d.path == "a.txt").unwrap();
    assert_eq!(a.content, "content of a: now about apricots");
    assert_eq!(h.store.chunks_of(a.id), vec![a.content.clone()]);
    assert_eq!(h.store.embedding_count(), 2);
}

#[tokio::test]
async fn append_only_policy_keeps_first_version() {
    let tmp = TempDir::new().unwrap();
    write_scenario(tmp.path());
    let topic = Topic::directory("docs", tmp.path());
    let h = harness_with(|p| p.with_refresh_changed(false));
    h.pipeline.run(&[topic.clone()], &ProgressMonitor::silent()).await;

    fs::write(tmp.path().join("a.txt"), "something else entirely").unwrap();
    let summary = h.pipeline.run(&[topic], &ProgressMonitor::silent()).await;
    assert_eq!(summary.refreshed, 0);
    assert_eq!(summary.skipped, 3);

    let a = h
        .store
        .documents()
        .into_iter()
        .find(|d| d.path == "a.txt")
        .unwrap();
    assert_eq!(a.content, "content of a: apples and avocados");
}

#[tokio::test]
async fn failing_file_is_recorded_and_rolled_back() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("good1.txt"), "first good file").unwrap();
    fs::write(tmp.path().join("bad.txt"), "this one will FAIL to embed").unwrap();
    fs::write(tmp.path().join("good2.txt"), "second good file").unwrap();
    let h = harness();

    let monitor = ProgressMonitor::silent();
    let summary = h
        .pipeline
        .run(&[Topic::directory("docs", tmp.path())], &monitor)
        .await;

    assert_eq!(summary.created, 2);
    assert_eq!(summary.errors.len(), 1);
    assert!(
        summary.errors[0].starts_with("docs: bad.txt: "),
        "error: {}",
        summary.errors[0]
    );
    assert!(summary.errors[0].contains("500"));
    assert_eq!(monitor.snapshot().completed, 3);
    assert_eq!(monitor.snapshot().errors, summary.errors);

    // No orphan document for the failed file.
    assert!(h.store.documents().iter().all(|d| d.path != "bad.txt"));
}

#[tokio::test]
async fn retrieval_is_isolated_by_topic() {
    let tmp = TempDir::new().unwrap();
    let (dir_a, dir_b) = (tmp.path().join("a"), tmp.path().join("b"));
    fs::create_dir_all(&dir_a).unwrap();
    fs::create_dir_all(&dir_b).unwrap();
    fs::write(dir_a.join("x.txt"), "shared words alpha").unwrap();
    fs::write(dir_b.join("x.txt"), "shared words beta").unwrap();
    let h = harness();

    let summary = h
        .pipeline
        .run(
            &[Topic::directory("a", &dir_a), Topic::directory("b", &dir_b)],
            &ProgressMonitor::silent(),
        )
        .await;
    assert_eq!(summary.created, 2);

    let only_a = h
        .engine
        .retrieve("shared words beta", &["a".to_string()], 10)
        .await
        .unwrap();
    assert_eq!(only_a, vec!["shared words alpha".to_string()]);

    let none = h.engine.retrieve("shared words", &[], 10).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn removing_a_topic_cascades() {
    let tmp = TempDir::new().unwrap();
    write_scenario(tmp.path());
    let h = harness();
    h.pipeline
        .run(&[Topic::directory("docs", tmp.path())], &ProgressMonitor::silent())
        .await;
    assert!(h.store.embedding_count() > 0);

    let removed = h.store.remove_topic("docs").await.unwrap();
    assert_eq!(removed, 2);
    assert!(h.store.documents().is_empty());
    assert_eq!(h.store.embedding_count(), 0);
}

#[tokio::test]
async fn missing_root_and_no_topics_are_quiet() {
    let tmp = TempDir::new().unwrap();
    let h = harness();

    let summary = h
        .pipeline
        .run(
            &[Topic::directory("gone", tmp.path().join("nope"))],
            &ProgressMonitor::silent(),
        )
        .await;
    assert_eq!(summary.files, 0);
    assert!(summary.errors.is_empty());

    let summary = h.pipeline.run(&[], &ProgressMonitor::silent()).await;
    assert_eq!(summary.files, 0);
}

#[tokio::test]
async fn long_document_is_chunked_and_every_chunk_embedded() {
    let tmp = TempDir::new().unwrap();
    let text = (0..120)
        .map(|i| format!("Line {} describes item {}.", i, i * 3))
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(tmp.path().join("long.md"), &text).unwrap();
    let h = harness_with(|p| p.with_splitter(TextSplitter::new(300, 50)));

    h.pipeline
        .run(&[Topic::directory("docs", tmp.path())], &ProgressMonitor::silent())
        .await;

    let doc = h.store.documents().pop().unwrap();
    let chunks = h.store.chunks_of(doc.id);
    assert_eq!(chunks, TextSplitter::new(300, 50).split(&text));
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.chars().count() <= 300));
}

#[tokio::test]
async fn concurrent_workers_index_each_file_once() {
    let tmp = TempDir::new().unwrap();
    for i in 0..20 {
        fs::write(tmp.path().join(format!("f{i:02}.txt")), format!("file number {i}")).unwrap();
    }
    let h = harness_with(|p| p.with_workers(4));

    let monitor = ProgressMonitor::silent();
    let summary = h
        .pipeline
        .run(&[Topic::directory("docs", tmp.path())], &monitor)
        .await;

    assert_eq!(summary.created, 20);
    assert_eq!(monitor.snapshot().completed, 20);
    let mut paths: Vec<String> = h.store.documents().into_iter().map(|d| d.path).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 20);
}

/// Returns one vector per call regardless of how many texts it was given.
struct ShortBatch;

#[async_trait]
impl Embedder for ShortBatch {
    fn model_name(&self) -> &str {
        "short-batch"
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().take(1).map(|t| embed(t)).collect())
    }
}

#[tokio::test]
async fn short_embedding_batch_fails_the_file() {
    let tmp = TempDir::new().unwrap();
    let text = (0..120)
        .map(|i| format!("Line {} describes item {}.", i, i * 3))
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(tmp.path().join("long.md"), &text).unwrap();
    fs::write(tmp.path().join("short.txt"), "fits in one chunk").unwrap();

    let store = InMemoryStore::new();
    let pipeline = IngestionPipeline::new(Arc::new(store.clone()), Arc::new(ShortBatch))
        .with_splitter(TextSplitter::new(300, 50));
    let summary = pipeline
        .run(&[Topic::directory("docs", tmp.path())], &ProgressMonitor::silent())
        .await;

    assert_eq!(summary.created, 1);
    assert_eq!(summary.errors.len(), 1);
    assert!(
        summary.errors[0].starts_with("docs: long.md: "),
        "error: {}",
        summary.errors[0]
    );
    assert!(summary.errors[0].contains("vectors for"));

    let docs = store.documents();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].path, "short.txt");
    assert_eq!(store.embedding_count(), 1);
}

#[derive(Clone, Copy)]
enum FailAt {
    Embedding,
    Commit,
}

/// Delegates to an [`InMemoryStore`] but breaks transactions that touch a
/// document whose path contains `broken`.
struct BrokenStore {
    inner: InMemoryStore,
    fail_at: FailAt,
}

struct BrokenTransaction {
    inner: Box<dyn IndexTransaction>,
    fail_at: FailAt,
    broken_id: Option<i64>,
}

#[async_trait]
impl IndexStore for BrokenStore {
    async fn begin(&self) -> Result<Box<dyn IndexTransaction>, StoreError> {
        Ok(Box::new(BrokenTransaction {
            inner: self.inner.begin().await?,
            fail_at: self.fail_at,
            broken_id: None,
        }))
    }

    async fn search(
        &self,
        query: &[f32],
        topics: &[String],
        k: i64,
    ) -> Result<Vec<String>, StoreError> {
        self.inner.search(query, topics, k).await
    }

    async fn remove_topic(&self, topic: &str) -> Result<u64, StoreError> {
        self.inner.remove_topic(topic).await
    }

    async fn topic_stats(&self) -> Result<Vec<TopicStats>, StoreError> {
        self.inner.topic_stats().await
    }
}

#[async_trait]
impl IndexTransaction for BrokenTransaction {
    async fn find_document(
        &mut self,
        topic: &str,
        path: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        self.inner.find_document(topic, path).await
    }

    async fn insert_document(&mut self, doc: &NewDocument) -> Result<i64, StoreError> {
        let id = self.inner.insert_document(doc).await?;
        if doc.path.contains("broken") {
            self.broken_id = Some(id);
        }
        Ok(id)
    }

    async fn delete_document(&mut self, id: i64) -> Result<(), StoreError> {
        self.inner.delete_document(id).await
    }

    async fn insert_embedding(
        &mut self,
        document_id: i64,
        content: &str,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        if matches!(self.fail_at, FailAt::Embedding) && self.broken_id == Some(document_id) {
            return Err(StoreError::ForeignKey(document_id));
        }
        self.inner.insert_embedding(document_id, content, vector).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let BrokenTransaction {
            inner,
            fail_at,
            broken_id,
        } = *self;
        if let (FailAt::Commit, Some(id)) = (fail_at, broken_id) {
            inner.rollback().await?;
            return Err(StoreError::ForeignKey(id));
        }
        inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollback().await
    }
}

async fn run_with_broken_store(fail_at: FailAt) {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("good1.txt"), "first good file").unwrap();
    fs::write(tmp.path().join("broken.txt"), "the store rejects this one").unwrap();
    fs::write(tmp.path().join("good2.txt"), "second good file").unwrap();

    let inner = InMemoryStore::new();
    let store = BrokenStore {
        inner: inner.clone(),
        fail_at,
    };
    let pipeline = IngestionPipeline::new(Arc::new(store), Arc::new(BagOfWords));
    let monitor = ProgressMonitor::silent();
    let summary = pipeline
        .run(&[Topic::directory("docs", tmp.path())], &monitor)
        .await;

    assert_eq!(summary.created, 2);
    assert_eq!(summary.errors.len(), 1, "errors: {:?}", summary.errors);
    assert!(
        summary.errors[0].starts_with("docs: broken.txt: "),
        "error: {}",
        summary.errors[0]
    );
    assert!(summary.errors[0].contains("does not exist"));
    assert_eq!(monitor.snapshot().completed, 3);

    let paths: Vec<String> = inner.documents().into_iter().map(|d| d.path).collect();
    assert_eq!(paths.len(), 2);
    assert!(!paths.contains(&"broken.txt".to_string()));
    assert_eq!(inner.embedding_count(), 2);
}

#[tokio::test]
async fn store_failure_on_insert_rolls_back_the_file() {
    run_with_broken_store(FailAt::Embedding).await;
}

#[tokio::test]
async fn store_failure_on_commit_rolls_back_the_file() {
    run_with_broken_store(FailAt::Commit).await;
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_entries_do_not_stop_the_topic() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "apples").unwrap();
    let mut topic = Topic::directory("docs", tmp.path());
    topic.follow_symlinks = true;
    std::os::unix::fs::symlink(tmp.path().join("missing"), tmp.path().join("dangling")).unwrap();
    let h = harness();

    let monitor = ProgressMonitor::silent();
    let summary = h.pipeline.run(&[topic], &monitor).await;

    assert_eq!(summary.files, 1);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.errors.len(), 1, "errors: {:?}", summary.errors);
    assert!(summary.errors[0].starts_with("docs: dangling: "));
    assert_eq!(monitor.snapshot().errors, summary.errors);
}

