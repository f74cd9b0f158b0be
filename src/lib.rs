//! # topic-rag
//!
//! Topic-scoped retrieval-augmented context over PostgreSQL + pgvector.
//!
//! Files are grouped into named **topics**. Ingestion extracts their text,
//! splits it into overlapping chunks, embeds each chunk and stores
//! documents and embeddings transactionally, one file at a time.
//! Retrieval embeds a query and returns the nearest chunks, restricted to
//! the topics selected by the caller's workspace and project.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌───────────────────────────┐   ┌────────────┐
//! │ Topics  │──▶│ extract → chunk → embed   │──▶│ PostgreSQL │
//! │ (dirs)  │   │ (one transaction per file)│   │  pgvector  │
//! └─────────┘   └───────────────────────────┘   └─────┬──────┘
//!                                                     │
//!          workspace + project topics ──▶ retrieve ◀──┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed errors |
//! | [`db`] | PostgreSQL connection pool |
//! | [`schema`] | Extension and table verification/creation |
//! | [`extract`] | File → text (plain, PDF, OOXML) |
//! | [`chunk`] | Recursive overlapping text splitter |
//! | [`embedding`] | Embedding clients (Ollama, OpenAI) |
//! | [`collect`] | Topic file enumeration |
//! | [`store`] | Index storage seam (PostgreSQL, in-memory) |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieve`] | Topic-scoped retrieval |
//! | [`context`] | Workspace/project topic selections |
//! | [`progress`] | Ingestion progress reporting |
//! | [`topics`] | Topic listing |
//! | [`stats`] | Index statistics |

pub mod chunk;
pub mod collect;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod progress;
pub mod retrieve;
pub mod schema;
pub mod stats;
pub mod store;
pub mod topics;
