//! Index statistics.
//!
//! Summarizes what is indexed per topic: document and embedding counts.
//! Used by `topic-rag stats` to confirm that ingestion is doing what it
//! should.

use std::io::Write;

use anyhow::Result;

use crate::models::TopicStats;
use crate::store::IndexStore;

pub async fn run_stats(store: &dyn IndexStore, out: &mut impl Write) -> Result<()> {
    let stats = store.topic_stats().await?;
    print_stats(&stats, out)
}

pub fn print_stats(stats: &[TopicStats], out: &mut impl Write) -> Result<()> {
    let documents: i64 = stats.iter().map(|s| s.documents).sum();
    let embeddings: i64 = stats.iter().map(|s| s.embeddings).sum();

    writeln!(out, "Documents:   {}", documents)?;
    writeln!(out, "Embeddings:  {}", embeddings)?;

    if !stats.is_empty() {
        writeln!(out)?;
        writeln!(out, "{:<24} {:>8} {:>12}", "TOPIC", "DOCS", "EMBEDDINGS")?;
        writeln!(out, "{}", "-".repeat(46))?;
        for s in stats {
            writeln!(out, "{:<24} {:>8} {:>12}", s.topic, s.documents, s.embeddings)?;
        }
    }
    Ok(())
}
