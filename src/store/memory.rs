//! In-memory [`IndexStore`] implementation.
//!
//! Documents and embeddings live in a `HashMap` and a `Vec` behind a
//! `std::sync::Mutex`. Transactions stage their writes and apply them
//! under the lock on commit; ids are drawn from an atomic counter, so like
//! a database sequence they are never reused after a rollback.
//! Vector search is brute-force L2 distance, matching pgvector's `<->`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{IndexStore, IndexTransaction};
use crate::error::StoreError;
use crate::models::{NewDocument, StoredDocument, TopicStats};

struct StoredEmbedding {
    document_id: i64,
    content: String,
    vector: Vec<f32>,
}

#[derive(Default)]
struct State {
    documents: HashMap<i64, StoredDocument>,
    embeddings: Vec<StoredEmbedding>,
}

impl State {
    fn delete_document(&mut self, id: i64) {
        self.documents.remove(&id);
        self.embeddings.retain(|e| e.document_id != id);
    }
}

/// In-memory index for tests and database-less use.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All documents, ordered by id.
    pub fn documents(&self) -> Vec<StoredDocument> {
        let state = lock(&self.state);
        let mut docs: Vec<StoredDocument> = state.documents.values().cloned().collect();
        docs.sort_by_key(|d| d.id);
        docs
    }

    /// Chunk texts stored for one document, in insertion order.
    pub fn chunks_of(&self, document_id: i64) -> Vec<String> {
        lock(&self.state)
            .embeddings
            .iter()
            .filter(|e| e.document_id == document_id)
            .map(|e| e.content.clone())
            .collect()
    }

    pub fn embedding_count(&self) -> usize {
        lock(&self.state).embeddings.len()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn IndexTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            next_id: Arc::clone(&self.next_id),
            ops: Vec::new(),
        }))
    }

    async fn search(
        &self,
        query: &[f32],
        topics: &[String],
        k: i64,
    ) -> Result<Vec<String>, StoreError> {
        if k <= 0 || topics.is_empty() {
            return Ok(Vec::new());
        }
        let state = lock(&self.state);
        let mut hits: Vec<(f32, &str)> = state
            .embeddings
            .iter()
            .filter(|e| {
                state
                    .documents
                    .get(&e.document_id)
                    .is_some_and(|d| topics.contains(&d.topic))
            })
            .map(|e| (l2_distance(query, &e.vector), e.content.as_str()))
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits
            .into_iter()
            .take(k as usize)
            .map(|(_, content)| content.to_string())
            .collect())
    }

    async fn remove_topic(&self, topic: &str) -> Result<u64, StoreError> {
        let mut state = lock(&self.state);
        let ids: Vec<i64> = state
            .documents
            .values()
            .filter(|d| d.topic == topic)
            .map(|d| d.id)
            .collect();
        for id in &ids {
            state.delete_document(*id);
        }
        Ok(ids.len() as u64)
    }

    async fn topic_stats(&self) -> Result<Vec<TopicStats>, StoreError> {
        let state = lock(&self.state);
        let mut by_topic: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
        for doc in state.documents.values() {
            by_topic.entry(doc.topic.as_str()).or_default().0 += 1;
        }
        for emb in &state.embeddings {
            if let Some(doc) = state.documents.get(&emb.document_id) {
                by_topic.entry(doc.topic.as_str()).or_default().1 += 1;
            }
        }
        Ok(by_topic
            .into_iter()
            .map(|(topic, (documents, embeddings))| TopicStats {
                topic: topic.to_string(),
                documents,
                embeddings,
            })
            .collect())
    }
}

enum Op {
    InsertDocument(StoredDocument),
    DeleteDocument(i64),
    InsertEmbedding(StoredEmbedding),
}

pub struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    next_id: Arc<AtomicI64>,
    ops: Vec<Op>,
}

impl MemoryTransaction {
    /// Whether `id` is visible to this transaction: committed or staged,
    /// and not deleted since.
    fn document_visible(&self, id: i64) -> bool {
        let mut visible = lock(&self.state).documents.contains_key(&id);
        for op in &self.ops {
            match op {
                Op::InsertDocument(d) if d.id == id => visible = true,
                Op::DeleteDocument(d) if *d == id => visible = false,
                _ => {}
            }
        }
        visible
    }
}

#[async_trait]
impl IndexTransaction for MemoryTransaction {
    async fn find_document(
        &mut self,
        topic: &str,
        path: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let mut candidates: Vec<StoredDocument> = lock(&self.state)
            .documents
            .values()
            .filter(|d| d.topic == topic && d.path == path)
            .cloned()
            .collect();
        for op in &self.ops {
            match op {
                Op::InsertDocument(d) if d.topic == topic && d.path == path => {
                    candidates.push(d.clone())
                }
                Op::DeleteDocument(id) => candidates.retain(|d| d.id != *id),
                _ => {}
            }
        }
        Ok(candidates.into_iter().min_by_key(|d| d.id))
    }

    async fn insert_document(&mut self, doc: &NewDocument) -> Result<i64, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.ops.push(Op::InsertDocument(StoredDocument {
            id,
            topic: doc.topic.clone(),
            path: doc.path.clone(),
            content: doc.content.clone(),
        }));
        Ok(id)
    }

    async fn delete_document(&mut self, id: i64) -> Result<(), StoreError> {
        self.ops.push(Op::DeleteDocument(id));
        Ok(())
    }

    async fn insert_embedding(
        &mut self,
        document_id: i64,
        content: &str,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        if !self.document_visible(document_id) {
            return Err(StoreError::ForeignKey(document_id));
        }
        self.ops.push(Op::InsertEmbedding(StoredEmbedding {
            document_id,
            content: content.to_string(),
            vector: vector.to_vec(),
        }));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { state, ops, .. } = *self;
        let mut state = lock(&state);
        for op in ops {
            match op {
                Op::InsertDocument(doc) => {
                    state.documents.insert(doc.id, doc);
                }
                Op::DeleteDocument(id) => state.delete_document(id),
                Op::InsertEmbedding(emb) => {
                    // The parent may have been removed concurrently.
                    if state.documents.contains_key(&emb.document_id) {
                        state.embeddings.push(emb);
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
