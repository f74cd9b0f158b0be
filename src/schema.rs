//! Schema verification and creation for the pgvector index.
//!
//! [`SchemaManager::ensure_schema`] makes sure the `vector` extension is
//! installed and that the documents and embeddings tables exist with the
//! expected columns. Missing tables are created; pre-existing tables are
//! validated and never altered. Any mismatch is a [`SchemaError`] and is not
//! retried: these are configuration problems the operator has to fix.
//!
//! Catalog access sits behind the [`Catalog`] trait. [`PgCatalog`] runs the
//! checks inside a single PostgreSQL transaction.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::{DbConfig, EmbeddingConfig};
use crate::db::quote_ident;
use crate::error::SchemaError;

/// Column name → type name. User-defined types (such as `vector`) are
/// reported by their `udt_name`.
pub type ColumnTypes = HashMap<String, String>;

const INTEGER_TYPES: &[&str] = &["smallint", "integer", "bigint"];

const DOCUMENT_COLUMNS: &[(&str, &[&str])] = &[
    ("path", &["text"]),
    ("topic", &["text"]),
    ("content", &["text"]),
];

const EMBEDDING_COLUMNS: &[(&str, &[&str])] = &[
    ("document_id", INTEGER_TYPES),
    ("embedding", &["vector"]),
    ("content", &["text"]),
];

/// Read and DDL access to the database catalog.
#[async_trait]
pub trait Catalog: Send {
    /// Run `CREATE EXTENSION IF NOT EXISTS vector`.
    async fn create_vector_extension(&mut self) -> Result<(), SchemaError>;
    async fn vector_extension_installed(&mut self) -> Result<bool, SchemaError>;
    async fn table_exists(&mut self, table: &str) -> Result<bool, SchemaError>;
    async fn column_types(&mut self, table: &str) -> Result<ColumnTypes, SchemaError>;
    /// Whether `table.column` references `target.id`.
    async fn has_foreign_key(
        &mut self,
        table: &str,
        column: &str,
        target: &str,
    ) -> Result<bool, SchemaError>;
    async fn create_documents_table(&mut self, table: &str) -> Result<(), SchemaError>;
    async fn create_embeddings_table(
        &mut self,
        table: &str,
        documents_table: &str,
        dims: Option<usize>,
    ) -> Result<(), SchemaError>;
}

/// Verifies or creates the documents/embeddings tables for one table prefix.
pub struct SchemaManager {
    documents_table: String,
    embeddings_table: String,
    dims: Option<usize>,
}

impl SchemaManager {
    pub fn new(db: &DbConfig, embedding: &EmbeddingConfig) -> Self {
        Self {
            documents_table: db.documents_table(),
            embeddings_table: db.embeddings_table(),
            dims: embedding.dims,
        }
    }

    pub fn documents_table(&self) -> &str {
        &self.documents_table
    }

    pub fn embeddings_table(&self) -> &str {
        &self.embeddings_table
    }

    /// Verify the schema against PostgreSQL, creating what is missing.
    ///
    /// Everything runs in one transaction; on error nothing is committed.
    pub async fn ensure_schema(&self, pool: &PgPool) -> Result<(), SchemaError> {
        let mut catalog = PgCatalog::begin(pool).await?;
        self.ensure_with(&mut catalog).await?;
        catalog.commit().await?;
        info!(
            documents = %self.documents_table,
            embeddings = %self.embeddings_table,
            "schema ready"
        );
        Ok(())
    }

    /// Apply the schema checks through any [`Catalog`].
    pub async fn ensure_with<C: Catalog + ?Sized>(
        &self,
        catalog: &mut C,
    ) -> Result<(), SchemaError> {
        self.ensure_extension(catalog).await?;
        self.ensure_documents_table(catalog).await?;
        self.ensure_embeddings_table(catalog).await?;
        Ok(())
    }

    async fn ensure_extension<C: Catalog + ?Sized>(
        &self,
        catalog: &mut C,
    ) -> Result<(), SchemaError> {
        catalog.create_vector_extension().await?;
        if !catalog.vector_extension_installed().await? {
            return Err(SchemaError::ExtensionUnavailable);
        }
        Ok(())
    }

    async fn ensure_documents_table<C: Catalog + ?Sized>(
        &self,
        catalog: &mut C,
    ) -> Result<(), SchemaError> {
        let table = &self.documents_table;
        if !catalog.table_exists(table).await? {
            debug!(table = %table, "creating documents table");
            return catalog.create_documents_table(table).await;
        }

        let columns = catalog.column_types(table).await?;
        validate_columns(table, &columns, DOCUMENT_COLUMNS)
    }

    async fn ensure_embeddings_table<C: Catalog + ?Sized>(
        &self,
        catalog: &mut C,
    ) -> Result<(), SchemaError> {
        let table = &self.embeddings_table;
        if !catalog.table_exists(table).await? {
            debug!(table = %table, dims = ?self.dims, "creating embeddings table");
            return catalog
                .create_embeddings_table(table, &self.documents_table, self.dims)
                .await;
        }

        let columns = catalog.column_types(table).await?;
        validate_columns(table, &columns, EMBEDDING_COLUMNS)?;

        if !catalog
            .has_foreign_key(table, "document_id", &self.documents_table)
            .await?
        {
            return Err(SchemaError::MissingForeignKey {
                table: table.clone(),
                column: "document_id".to_string(),
                target: self.documents_table.clone(),
            });
        }
        Ok(())
    }
}

/// Check that every required column exists with one of its accepted types.
///
/// Missing columns are reported before type mismatches, each listing every
/// offending column in the order given.
pub fn validate_columns(
    table: &str,
    columns: &ColumnTypes,
    required: &[(&str, &[&str])],
) -> Result<(), SchemaError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|(name, _)| !columns.contains_key(*name))
        .map(|(name, _)| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SchemaError::MissingColumns {
            table: table.to_string(),
            columns: missing,
        });
    }

    let details: Vec<String> = required
        .iter()
        .filter_map(|(name, accepted)| {
            let actual = &columns[*name];
            if accepted.contains(&actual.as_str()) {
                None
            } else {
                Some(format!(
                    "{} (expected {}, got {})",
                    name,
                    accepted.join(" or "),
                    actual
                ))
            }
        })
        .collect();
    if !details.is_empty() {
        return Err(SchemaError::InvalidColumnTypes {
            table: table.to_string(),
            details,
        });
    }
    Ok(())
}

/// [`Catalog`] over a PostgreSQL transaction in the `public` schema.
pub struct PgCatalog {
    tx: Transaction<'static, Postgres>,
}

impl PgCatalog {
    pub async fn begin(pool: &PgPool) -> Result<Self, SchemaError> {
        Ok(Self {
            tx: pool.begin().await?,
        })
    }

    pub async fn commit(self) -> Result<(), SchemaError> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// SQLSTATEs `CREATE EXTENSION` raises when the server cannot provide it:
/// not installed (`0A000`, or `58P01` on older servers) or not permitted.
fn extension_unavailable(code: Option<&str>) -> bool {
    matches!(code, Some("0A000" | "58P01" | "42501"))
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn create_vector_extension(&mut self) -> Result<(), SchemaError> {
        match sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&mut *self.tx)
            .await
        {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if extension_unavailable(e.code().as_deref()) => {
                warn!(code = ?e.code(), error = %e.message(), "cannot create vector extension");
                Err(SchemaError::ExtensionUnavailable)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn vector_extension_installed(&mut self) -> Result<bool, SchemaError> {
        let row = sqlx::query("SELECT 1 FROM pg_extension WHERE extname = 'vector'")
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.is_some())
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool, SchemaError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM information_schema.tables
                WHERE table_schema = 'public'
                  AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn column_types(&mut self, table: &str) -> Result<ColumnTypes, SchemaError> {
        let rows = sqlx::query(
            r#"
            SELECT column_name::text AS column_name,
                   data_type::text AS data_type,
                   udt_name::text AS udt_name
            FROM information_schema.columns
            WHERE table_schema = 'public'
              AND table_name = $1
            "#,
        )
        .bind(table)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut columns = ColumnTypes::new();
        for row in rows {
            let name: String = row.try_get("column_name")?;
            let data_type: String = row.try_get("data_type")?;
            let udt_name: String = row.try_get("udt_name")?;
            let ty = if data_type == "USER-DEFINED" {
                udt_name
            } else {
                data_type
            };
            columns.insert(name, ty);
        }
        Ok(columns)
    }

    async fn has_foreign_key(
        &mut self,
        table: &str,
        column: &str,
        target: &str,
    ) -> Result<bool, SchemaError> {
        let row = sqlx::query(
            r#"
            SELECT 1
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
              ON ccu.constraint_name = tc.constraint_name
             AND ccu.table_schema = tc.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
              AND tc.table_schema = 'public'
              AND tc.table_name = $1
              AND kcu.column_name = $2
              AND ccu.table_name = $3
              AND ccu.column_name = 'id'
            "#,
        )
        .bind(table)
        .bind(column)
        .bind(target)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.is_some())
    }

    async fn create_documents_table(&mut self, table: &str) -> Result<(), SchemaError> {
        let sql = format!(
            r#"
            CREATE TABLE {} (
                id BIGSERIAL PRIMARY KEY,
                path TEXT NOT NULL,
                topic TEXT NOT NULL,
                content TEXT NOT NULL
            )
            "#,
            quote_ident(table)
        );
        sqlx::query(&sql).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn create_embeddings_table(
        &mut self,
        table: &str,
        documents_table: &str,
        dims: Option<usize>,
    ) -> Result<(), SchemaError> {
        let vector_type = match dims {
            Some(d) => format!("VECTOR({})", d),
            None => "VECTOR".to_string(),
        };
        let sql = format!(
            r#"
            CREATE TABLE {} (
                id BIGSERIAL PRIMARY KEY,
                document_id BIGINT NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
                content TEXT,
                embedding {}
            )
            "#,
            quote_ident(table),
            quote_ident(documents_table),
            vector_type
        );
        sqlx::query(&sql).execute(&mut *self.tx).await?;
        Ok(())
    }
}
