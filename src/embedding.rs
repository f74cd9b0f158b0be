//! Embedding clients.
//!
//! Defines the [`Embedder`] trait and its implementations:
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on an Ollama instance (default).
//! - **[`OpenAIEmbedder`]**: the OpenAI embeddings API.
//! - **[`DisabledEmbedder`]**: always fails; used when embeddings are switched off.
//!
//! Failures surface as [`EmbeddingError`] and are never retried here; the
//! caller decides whether to record and continue or to give up. No request
//! timeout applies unless `embedding.timeout_secs` is set.
//!
//! Also provides [`vector_literal`], the textual form sent to pgvector.
//!
//! # Provider Selection
//!
//! ```rust,no_run
//! # use topic_rag::config::EmbeddingConfig;
//! # use topic_rag::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "ollama", model = "bge-m3"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "bge-m3");
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

pub const DEFAULT_OLLAMA_MODEL: &str = "bge-m3";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Embed a batch. Exactly one vector per input, in input order.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text (a query).
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            got: 0,
        })
    }
}

/// Build the embedder named by `embedding.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

/// Serialize a vector as pgvector text: `[v1,v2,...]`, six decimals each.
pub fn vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| format!("{:.6}", v)).collect();
    format!("[{}]", parts.join(","))
}

fn check_count(expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            got: vectors.len(),
        });
    }
    Ok(vectors)
}

fn json_vector(value: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    let items = value
        .as_array()
        .ok_or_else(|| EmbeddingError::InvalidResponse("embedding is not an array".into()))?;
    items
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| EmbeddingError::InvalidResponse("non-numeric component".into()))
        })
        .collect()
}

async fn post_json(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<serde_json::Value, EmbeddingError> {
    let response = request.json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbeddingError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

// ============ Disabled ============

pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed_many(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }
}

// ============ Ollama ============

/// Embeddings from a running Ollama instance.
///
/// Requires the model to be pulled beforehand (`ollama pull bge-m3`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    url: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string());
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: http_client(config)?,
            model,
            url,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        debug!(model = %self.model, inputs = texts.len(), "ollama embed");
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = post_json(self.client.post(format!("{}/api/embed", self.url)), &body).await?;
        check_count(texts.len(), parse_ollama_response(&json)?)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing embeddings array".into()))?
        .iter()
        .map(json_vector)
        .collect()
}

// ============ OpenAI ============

/// Embeddings from the OpenAI API (or a compatible endpoint via `url`).
///
/// Reads the key from `OPENAI_API_KEY` at construction.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    model: String,
    url: String,
    api_key: String,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| EmbeddingError::MissingApiKey)?;
        Ok(Self {
            client: http_client(config)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        debug!(model = %self.model, inputs = texts.len(), "openai embed");
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/v1/embeddings", self.url))
            .bearer_auth(&self.api_key);
        let json = post_json(request, &body).await?;
        check_count(texts.len(), parse_openai_response(&json)?)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| EmbeddingError::InvalidResponse("missing embedding".into()))?;
        indexed.push((index, json_vector(embedding)?));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
