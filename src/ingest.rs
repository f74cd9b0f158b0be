//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow for every file of every requested topic:
//! collect → extract → text check → dedup check → chunk → embed → store.
//!
//! Each file is handled in its own store transaction. A failure anywhere
//! in a file's processing rolls that transaction back, is recorded as
//! `"{topic}: {relative_path}: {message}"` and the run moves on to the next
//! file. Progress advances by exactly one per file, whatever the outcome.
//!
//! A document is identified by `(topic, relative path)`. When
//! `refresh_changed` is on, a file whose extracted text differs from the
//! stored content is re-indexed (old rows deleted, new rows inserted in the
//! same transaction); otherwise an already-indexed file is never touched.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chunk::TextSplitter;
use crate::collect::collect_files;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::EmbeddingError;
use crate::extract::ContentExtractor;
use crate::models::{IngestSummary, NewDocument, SourceFile, Topic};
use crate::progress::ProgressMonitor;
use crate::store::{IndexStore, IndexTransaction};

pub const PROGRESS_TITLE: &str = "RAG ingest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Refreshed,
    Skipped,
}

pub struct IngestionPipeline {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
    extractor: ContentExtractor,
    splitter: TextSplitter,
    workers: usize,
    refresh_changed: bool,
}

impl IngestionPipeline {
    /// Pipeline with default chunking, one worker and refresh enabled.
    pub fn new(store: Arc<dyn IndexStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            extractor: ContentExtractor,
            splitter: TextSplitter::default(),
            workers: 1,
            refresh_changed: true,
        }
    }

    pub fn from_config(
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn Embedder>,
        config: &Config,
    ) -> Self {
        Self::new(store, embedder)
            .with_splitter(TextSplitter::new(
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            ))
            .with_workers(config.ingest.workers)
            .with_refresh_changed(config.ingest.refresh_changed)
    }

    pub fn with_splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_refresh_changed(mut self, refresh_changed: bool) -> Self {
        self.refresh_changed = refresh_changed;
        self
    }

    /// Index every file of `topics`. Never fails as a whole: per-file and
    /// per-topic problems end up in [`IngestSummary::errors`].
    pub async fn run(&self, topics: &[Topic], progress: &ProgressMonitor) -> IngestSummary {
        let mut summary = IngestSummary::default();
        progress.set_title(PROGRESS_TITLE);

        let mut files: Vec<SourceFile> = Vec::new();
        for topic in topics {
            match collect_files(topic) {
                Ok(found) => {
                    debug!(
                        topic = %topic.name,
                        files = found.files.len(),
                        errors = found.errors.len(),
                        "collected topic files"
                    );
                    files.extend(found.files);
                    for error in found.errors {
                        progress.add_error(error.clone());
                        summary.errors.push(error);
                    }
                }
                Err(e) => {
                    let error = format!("{}: {:#}", topic.name, e);
                    warn!(topic = %topic.name, error = %error, "failed to collect topic");
                    progress.add_error(error.clone());
                    summary.errors.push(error);
                }
            }
        }

        summary.files = files.len() as u64;
        progress.set_total_pending(summary.files);
        info!(
            topics = topics.len(),
            files = summary.files,
            workers = self.workers,
            "ingest started"
        );

        let results: Vec<Result<Outcome, String>> = stream::iter(files.iter())
            .map(|file| async move {
                progress.set_message(&format!("{}: {}", file.topic, file.relative_path));
                let result = match self.process_file(file).await {
                    Ok(outcome) => {
                        debug!(
                            topic = %file.topic,
                            path = %file.relative_path,
                            outcome = ?outcome,
                            "file processed"
                        );
                        Ok(outcome)
                    }
                    Err(e) => {
                        let error = format!("{}: {}: {:#}", file.topic, file.relative_path, e);
                        warn!(error = %error, "file failed");
                        progress.add_error(error.clone());
                        Err(error)
                    }
                };
                progress.advance(1);
                result
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        for result in results {
            match result {
                Ok(Outcome::Created) => summary.created += 1,
                Ok(Outcome::Refreshed) => summary.refreshed += 1,
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Err(error) => summary.errors.push(error),
            }
        }

        progress.finish();
        info!(
            created = summary.created,
            refreshed = summary.refreshed,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            "ingest finished"
        );
        summary
    }

    /// One file, one transaction. Skips roll back; failures roll back.
    async fn process_file(&self, file: &SourceFile) -> Result<Outcome> {
        let mut tx = self.store.begin().await?;
        let result = self.index_in(tx.as_mut(), file).await;
        match result {
            Ok(Outcome::Skipped) => {
                tx.rollback().await?;
                Ok(Outcome::Skipped)
            }
            Ok(outcome) => {
                tx.commit().await.context("commit failed")?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn index_in(
        &self,
        tx: &mut dyn IndexTransaction,
        file: &SourceFile,
    ) -> Result<Outcome> {
        let existing = tx.find_document(&file.topic, &file.relative_path).await?;
        if existing.is_some() && !self.refresh_changed {
            return Ok(Outcome::Skipped);
        }

        let extractor = self.extractor;
        let path = file.absolute_path.clone();
        let content = tokio::task::spawn_blocking(move || extractor.extract(&path))
            .await
            .context("extraction task failed")??;
        if content.is_empty() {
            return Ok(Outcome::Skipped);
        }

        let outcome = match existing {
            Some(doc) if doc.content == content => return Ok(Outcome::Skipped),
            Some(doc) => {
                tx.delete_document(doc.id).await?;
                Outcome::Refreshed
            }
            None => Outcome::Created,
        };

        let chunks = self.splitter.split(&content);
        let document_id = tx
            .insert_document(&NewDocument {
                topic: file.topic.clone(),
                path: file.relative_path.clone(),
                content,
            })
            .await?;

        if chunks.is_empty() {
            return Ok(outcome);
        }

        let vectors = self.embedder.embed_many(&chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: chunks.len(),
                got: vectors.len(),
            }
            .into());
        }
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            tx.insert_embedding(document_id, chunk, vector).await?;
        }
        Ok(outcome)
    }
}
