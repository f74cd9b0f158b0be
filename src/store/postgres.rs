//! PostgreSQL + pgvector backend.
//!
//! Vectors travel as text (`[v1,...,vn]`) and are cast with `::vector` in
//! SQL, so no pgvector-specific client type is needed. Ids are cast to
//! `bigint` on the way out because an existing `documents` table may use a
//! narrower integer column.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;
use tracing::debug;

use super::{IndexStore, IndexTransaction};
use crate::config::DbConfig;
use crate::db::quote_ident;
use crate::embedding::vector_literal;
use crate::error::StoreError;
use crate::models::{NewDocument, StoredDocument, TopicStats};

const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Clone)]
pub struct PgIndexStore {
    pool: PgPool,
    documents: String,
    embeddings: String,
}

impl PgIndexStore {
    pub fn new(pool: PgPool, config: &DbConfig) -> Self {
        Self {
            pool,
            documents: quote_ident(&config.documents_table()),
            embeddings: quote_ident(&config.embeddings_table()),
        }
    }
}

#[async_trait]
impl IndexStore for PgIndexStore {
    async fn begin(&self) -> Result<Box<dyn IndexTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgIndexTransaction {
            tx,
            documents: self.documents.clone(),
            embeddings: self.embeddings.clone(),
        }))
    }

    async fn search(
        &self,
        query: &[f32],
        topics: &[String],
        k: i64,
    ) -> Result<Vec<String>, StoreError> {
        let sql = format!(
            "SELECT e.content FROM {emb} e \
             JOIN {docs} d ON d.id = e.document_id \
             WHERE d.topic = ANY($1) \
             ORDER BY e.embedding <-> $2::vector \
             LIMIT $3",
            emb = self.embeddings,
            docs = self.documents,
        );
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(topics.to_vec())
            .bind(vector_literal(query))
            .bind(k)
            .fetch_all(&self.pool)
            .await?;
        debug!(topics = ?topics, k, hits = rows.len(), "similarity search");
        Ok(rows.into_iter().map(|(content,)| content).collect())
    }

    async fn remove_topic(&self, topic: &str) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "DELETE FROM {} WHERE document_id IN (SELECT id FROM {} WHERE topic = $1)",
            self.embeddings, self.documents
        ))
        .bind(topic)
        .execute(&mut *tx)
        .await?;
        let removed = sqlx::query(&format!("DELETE FROM {} WHERE topic = $1", self.documents))
            .bind(topic)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed)
    }

    async fn topic_stats(&self) -> Result<Vec<TopicStats>, StoreError> {
        let sql = format!(
            "SELECT d.topic, COUNT(DISTINCT d.id), COUNT(e.id) \
             FROM {docs} d LEFT JOIN {emb} e ON e.document_id = d.id \
             GROUP BY d.topic ORDER BY d.topic",
            docs = self.documents,
            emb = self.embeddings,
        );
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(topic, documents, embeddings)| TopicStats {
                topic,
                documents,
                embeddings,
            })
            .collect())
    }
}

pub struct PgIndexTransaction {
    tx: Transaction<'static, Postgres>,
    documents: String,
    embeddings: String,
}

#[async_trait]
impl IndexTransaction for PgIndexTransaction {
    async fn find_document(
        &mut self,
        topic: &str,
        path: &str,
    ) -> Result<Option<StoredDocument>, StoreError> {
        let sql = format!(
            "SELECT id::bigint, topic, path, content FROM {} \
             WHERE topic = $1 AND path = $2 ORDER BY id LIMIT 1",
            self.documents
        );
        let row: Option<(i64, String, String, String)> = sqlx::query_as(&sql)
            .bind(topic)
            .bind(path)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(|(id, topic, path, content)| StoredDocument {
            id,
            topic,
            path,
            content,
        }))
    }

    async fn insert_document(&mut self, doc: &NewDocument) -> Result<i64, StoreError> {
        let sql = format!(
            "INSERT INTO {} (topic, path, content) VALUES ($1, $2, $3) RETURNING id::bigint",
            self.documents
        );
        let (id,): (i64,) = sqlx::query_as(&sql)
            .bind(&doc.topic)
            .bind(&doc.path)
            .bind(&doc.content)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(id)
    }

    async fn delete_document(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE document_id = $1",
            self.embeddings
        ))
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.documents))
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_embedding(
        &mut self,
        document_id: i64,
        content: &str,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (document_id, content, embedding) VALUES ($1, $2, $3::vector)",
            self.embeddings
        );
        let result = sqlx::query(&sql)
            .bind(document_id)
            .bind(content)
            .bind(vector_literal(vector))
            .execute(&mut *self.tx)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
                Err(StoreError::ForeignKey(document_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
