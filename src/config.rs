//! TOML configuration.
//!
//! A single [`Config`] is loaded once at startup and passed by reference to
//! the schema manager, the ingestion pipeline and the retrieval engine.
//! Every section is optional; missing sections take the defaults below.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::models::Topic;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub topics: Vec<Topic>,
}

/// PostgreSQL connection parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Prepended to `documents` and `embeddings` so several indexes can
    /// share one database schema.
    #[serde(default)]
    pub table_prefix: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            table_prefix: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

impl DbConfig {
    pub fn documents_table(&self) -> String {
        format!("{}documents", self.table_prefix)
    }

    pub fn embeddings_table(&self) -> String {
        format!("{}embeddings", self.table_prefix)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5432
}
fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Fixes the vector dimension when the embeddings table is created.
    #[serde(default)]
    pub dims: Option<usize>,
    /// No timeout when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            dims: None,
            timeout_secs: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    900
}
fn default_chunk_overlap() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
        }
    }
}

fn default_k() -> i64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Files indexed concurrently. 1 processes files strictly in order.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Re-index documents whose source file content changed since the
    /// last run. When false the index is append-only.
    #[serde(default = "default_refresh_changed")]
    pub refresh_changed: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            refresh_changed: default_refresh_changed(),
        }
    }
}

fn default_workers() -> usize {
    1
}
fn default_refresh_changed() -> bool {
    true
}

impl Config {
    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }

    pub fn topic_names(&self) -> HashSet<String> {
        self.topics.iter().map(|t| t.name.clone()).collect()
    }
}

/// Conventional config location: `~/.config/topic-rag/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("topic-rag")
        .join("config.toml")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.default_k < 1 {
        bail!("retrieval.default_k must be >= 1");
    }

    if config.ingest.workers == 0 {
        bail!("ingest.workers must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }

    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }

    let mut seen = HashSet::new();
    for topic in &config.topics {
        if topic.name.trim().is_empty() {
            bail!("topic names must not be empty");
        }
        if !seen.insert(topic.name.as_str()) {
            bail!("duplicate topic name: '{}'", topic.name);
        }
    }

    Ok(config)
}
