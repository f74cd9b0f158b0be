//! Core data models that flow through ingestion and retrieval.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A named, path-rooted collection of source files to index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Topic {
    pub name: String,
    #[serde(default)]
    pub kind: TopicKind,
    pub path: PathBuf,
    /// Glob patterns, relative to the topic root, of files to leave out.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Descend into symlinked directories. Symlinked files are always listed.
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Topic {
    pub fn directory(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind: TopicKind::Directory,
            path: path.into(),
            exclude: Vec::new(),
            follow_symlinks: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    #[default]
    Directory,
}

/// A regular file found under a topic root, awaiting ingestion.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub topic: String,
    pub absolute_path: PathBuf,
    /// Path relative to the topic root, always `/`-separated.
    pub relative_path: String,
}

/// A document row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub topic: String,
    pub path: String,
    pub content: String,
}

/// A document row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub id: i64,
    pub topic: String,
    pub path: String,
    pub content: String,
}

/// Per-topic counts of stored rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicStats {
    pub topic: String,
    pub documents: i64,
    pub embeddings: i64,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Files visited across all topics.
    pub files: u64,
    /// Documents indexed for the first time.
    pub created: u64,
    /// Existing documents re-indexed because their content changed.
    pub refreshed: u64,
    /// Files left untouched: already indexed, unchanged, or not text.
    pub skipped: u64,
    /// `"{topic}: {relative_path}: {message}"`, one per failed file.
    pub errors: Vec<String>,
}
