//! Storage abstraction for the topic index.
//!
//! [`IndexStore`] is the seam between the ingestion pipeline / retrieval
//! engine and the database. Two backends exist:
//!
//! - [`postgres::PgIndexStore`]: the production store over pgvector.
//! - [`memory::InMemoryStore`]: brute-force store for tests and for tools
//!   that embed the pipeline without a database.
//!
//! Writes go through an [`IndexTransaction`]: everything done on one file
//! is committed or rolled back as a unit, so a failure halfway through a
//! file never leaves a document without its embeddings.
//!
//! Implementations must be `Send + Sync` to be shared across ingest workers.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{NewDocument, StoredDocument, TopicStats};

/// Shared access to the index.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Open a unit of work.
    async fn begin(&self) -> Result<Box<dyn IndexTransaction>, StoreError>;

    /// Chunk texts of the `k` embeddings nearest (L2) to `query`, restricted
    /// to documents whose topic is in `topics`. Nearest first.
    async fn search(
        &self,
        query: &[f32],
        topics: &[String],
        k: i64,
    ) -> Result<Vec<String>, StoreError>;

    /// Delete every document of `topic` and, by cascade, their embeddings.
    /// Returns the number of documents removed.
    async fn remove_topic(&self, topic: &str) -> Result<u64, StoreError>;

    /// Document and embedding counts per topic, ordered by topic name.
    async fn topic_stats(&self) -> Result<Vec<TopicStats>, StoreError>;
}

/// A single unit of work against the index.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// its writes.
#[async_trait]
pub trait IndexTransaction: Send {
    async fn find_document(
        &mut self,
        topic: &str,
        path: &str,
    ) -> Result<Option<StoredDocument>, StoreError>;

    /// Insert a document row and return its generated id.
    async fn insert_document(&mut self, doc: &NewDocument) -> Result<i64, StoreError>;

    /// Delete a document; its embeddings go with it.
    async fn delete_document(&mut self, id: i64) -> Result<(), StoreError>;

    /// Attach one chunk and its vector to an existing document.
    async fn insert_embedding(
        &mut self,
        document_id: i64,
        content: &str,
        vector: &[f32],
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
