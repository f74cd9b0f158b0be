//! Topic-scoped retrieval.
//!
//! [`RetrievalEngine::retrieve`] embeds the query and asks the store for
//! the `k` nearest chunks among the requested topics. There is no global
//! search: an empty topic set returns nothing without embedding the query
//! or touching the store. There is no re-ranking or score cutoff either.

use std::sync::Arc;
use tracing::debug;

use crate::context::TopicSelection;
use crate::embedding::Embedder;
use crate::error::RetrievalError;
use crate::store::IndexStore;

pub struct RetrievalEngine {
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn IndexStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Chunk texts nearest to `query`, nearest first, at most `k`.
    pub async fn retrieve(
        &self,
        query: &str,
        topics: &[String],
        k: i64,
    ) -> Result<Vec<String>, RetrievalError> {
        if topics.is_empty() || k <= 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_one(query).await?;
        let chunks = self.store.search(&vector, topics, k).await?;
        debug!(topics = ?topics, k, hits = chunks.len(), "retrieved");
        Ok(chunks)
    }

    /// Retrieve for the topics visible from a workspace/project pair and
    /// join the chunks with a blank line. Empty when nothing matched.
    pub async fn context_for(
        &self,
        question: &str,
        workspace: Option<&dyn TopicSelection>,
        project: Option<&dyn TopicSelection>,
        k: i64,
    ) -> Result<String, RetrievalError> {
        let topics = collect_topics(workspace, project);
        let chunks = self.retrieve(question, &topics, k).await?;
        Ok(chunks.join("\n\n"))
    }
}

/// Union of the workspace and project selections in first-seen order,
/// without duplicates or empty names.
pub fn collect_topics(
    workspace: Option<&dyn TopicSelection>,
    project: Option<&dyn TopicSelection>,
) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    for selection in [workspace, project].into_iter().flatten() {
        for topic in selection.topics() {
            if !topic.is_empty() && !topics.contains(topic) {
                topics.push(topic.clone());
            }
        }
    }
    topics
}

/// Substitute `{context}` and `{question}` in a prompt template.
pub fn render_prompt(template: &str, context: &str, question: &str) -> String {
    template
        .replace("{context}", context)
        .replace("{question}", question)
}
