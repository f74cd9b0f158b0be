//! Error types for schema setup, extraction, embedding, storage and retrieval.
//!
//! Schema errors are configuration problems and are surfaced immediately.
//! Extraction, embedding and storage errors raised while ingesting a single
//! file are recorded against that file by the pipeline and never abort a run.
//! Retrieval errors propagate to the caller as a whole; there is no partial
//! result.

use thiserror::Error;

/// The database schema cannot be used for the index.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("pgvector extension is not available in the database")]
    ExtensionUnavailable,

    #[error("Table '{table}' is missing columns: {}", .columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    #[error("Table '{table}' has invalid column types: {}", .details.join(", "))]
    InvalidColumnTypes { table: String, details: Vec<String> },

    #[error("Table '{table}' must have a foreign key from '{column}' to '{target}.id'")]
    MissingForeignKey {
        table: String,
        column: String,
        target: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Text extraction failed for a file.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// The embedding service could not produce vectors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding provider is disabled")]
    Disabled,

    #[error("OPENAI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Embedding service returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

/// A storage operation failed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Document {0} does not exist")]
    ForeignKey(i64),
}

/// A retrieval call failed. Distinct from an empty result.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Similarity search failed: {0}")]
    Store(#[from] StoreError),
}
