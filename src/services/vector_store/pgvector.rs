use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;
use tracing::debug;

use super::{VectorIndex, sort_results, validate_chunks, validate_query};
use crate::error::VectorStoreError;
use crate::models::{Chunk, ChunkFilter, ChunkKind, QueryResult, VectorStoreConfig};

/// PostgreSQL table with a pgvector column, queried by exact cosine scan.
///
/// No approximate (HNSW/IVFFlat) index is built: pgvector applies `WHERE`
/// filters after an approximate scan, so filtered queries could return fewer
/// than `k` eligible rows and rank them only approximately.
pub struct PgVectorIndex {
    pool: PgPool,
    table_name: String,
    table: String,
    schema: Option<String>,
    embedding_dim: usize,
}

impl PgVectorIndex {
    pub async fn connect(
        config: &VectorStoreConfig,
        embedding_dim: usize,
    ) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            pool,
            table_name: config.qualified_table_name(),
            table: config.table.clone(),
            schema: config.schema.clone(),
            embedding_dim,
        })
    }

    /// Create the schema, table and indices if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), VectorStoreError> {
        let extension: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await?;

        if extension.is_none() {
            return Err(VectorStoreError::SchemaError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        if let Some(ref schema) = self.schema {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::SchemaError(e.to_string()))?;
        }

        for statement in schema_statements(&self.table, &self.table_name, self.embedding_dim) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::SchemaError(e.to_string()))?;
        }

        Ok(())
    }

    fn row_to_result(row: &PgRow) -> Result<QueryResult, VectorStoreError> {
        let read = |e: sqlx::Error| VectorStoreError::SearchError(e.to_string());

        let id: String = row.try_get("chunk_id").map_err(read)?;
        let kind: String = row.try_get("chunk_kind").map_err(read)?;
        let chunk_index: i32 = row.try_get("chunk_index").map_err(read)?;
        let title: String = row.try_get("title").map_err(read)?;
        let url: Option<String> = row.try_get("url").map_err(read)?;
        let token_count: i32 = row.try_get("token_count").map_err(read)?;
        let embedding: Vector = row.try_get("embedding").map_err(read)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(read)?;
        let score: f64 = row.try_get("score").map_err(read)?;

        Ok(QueryResult {
            chunk: Chunk {
                id,
                document_id: row.try_get("document_id").map_err(read)?,
                kind: kind
                    .parse::<ChunkKind>()
                    .map_err(VectorStoreError::SearchError)?,
                chunk_index: chunk_index as u32,
                title,
                url,
                text: row.try_get("content").map_err(read)?,
                token_count: token_count as u32,
                embedding: embedding.to_vec(),
                created_at,
            },
            score: (score as f32).clamp(-1.0, 1.0),
        })
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn dimension(&self) -> Option<usize> {
        Some(self.embedding_dim)
    }

    async fn upsert(&self, document_id: &str, chunks: Vec<Chunk>) -> Result<(), VectorStoreError> {
        validate_chunks(document_id, &chunks, Some(self.embedding_dim))?;

        let insert = format!(
            r#"
            INSERT INTO {} (id, document_id, chunk_kind, chunk_index, title, url,
                            content, token_count, embedding, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
            self.table_name
        );
        let delete = format!("DELETE FROM {} WHERE document_id = $1", self.table_name);

        // Rolled back on drop if any statement fails
        let mut tx = self.pool.begin().await?;

        // Serializes replacements of the same document across connections
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(&delete)
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        let count = chunks.len();
        for chunk in chunks {
            let id = uuid::Uuid::parse_str(&chunk.id)
                .map_err(|e| VectorStoreError::UpsertError(format!("Invalid UUID: {}", e)))?;

            sqlx::query(&insert)
                .bind(id)
                .bind(&chunk.document_id)
                .bind(chunk.kind.to_string())
                .bind(chunk.chunk_index as i32)
                .bind(&chunk.title)
                .bind(&chunk.url)
                .bind(&chunk.text)
                .bind(chunk.token_count as i32)
                .bind(Vector::from(chunk.embedding))
                .bind(chunk.created_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(document_id, chunks = count, "replaced document chunks");
        Ok(())
    }

    async fn query(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<QueryResult>, VectorStoreError> {
        validate_query(query_vector, k, Some(self.embedding_dim))?;

        let query = select_sql(&self.table_name, filter, k);

        let mut query_builder = sqlx::query(&query).bind(Vector::from(query_vector.to_vec()));
        if let Some(ref document_id) = filter.document_id {
            query_builder = query_builder.bind(document_id);
        }
        if let Some(kind) = filter.kind {
            query_builder = query_builder.bind(kind.to_string());
        }

        let rows = query_builder.fetch_all(&self.pool).await.map_err(|e| {
            match VectorStoreError::from(e) {
                VectorStoreError::UpsertError(msg) => VectorStoreError::SearchError(msg),
                other => other,
            }
        })?;

        let mut results = rows
            .iter()
            .map(Self::row_to_result)
            .collect::<Result<Vec<_>, _>>()?;

        // Distance ordering can disagree with the rounded score on near-ties
        sort_results(&mut results);
        Ok(results)
    }

    async fn delete(&self, document_id: &str) -> Result<(), VectorStoreError> {
        let query = format!("DELETE FROM {} WHERE document_id = $1", self.table_name);

        sqlx::query(&query)
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

        Ok(())
    }

    async fn count(&self) -> Result<u64, VectorStoreError> {
        let query = format!("SELECT COUNT(*) FROM {}", self.table_name);
        let row: (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(row.0 as u64)
    }

    fn name(&self) -> &str {
        "postgresql"
    }
}

/// DDL for the chunk table and its lookup indices.
///
/// Also upgrades tables created with an approximate embedding index or
/// without the source columns.
fn schema_statements(table: &str, table_name: &str, embedding_dim: usize) -> Vec<String> {
    vec![
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table_name} (
                id UUID PRIMARY KEY,
                document_id TEXT NOT NULL,
                chunk_kind TEXT NOT NULL CHECK (chunk_kind IN ('header', 'content')),
                chunk_index INTEGER NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                url TEXT,
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                embedding vector({embedding_dim}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#
        ),
        format!("ALTER TABLE {table_name} ADD COLUMN IF NOT EXISTS title TEXT NOT NULL DEFAULT ''"),
        format!("ALTER TABLE {table_name} ADD COLUMN IF NOT EXISTS url TEXT"),
        format!("DROP INDEX IF EXISTS {}{table}_embedding_idx", schema_prefix(table_name, table)),
        format!("CREATE INDEX IF NOT EXISTS {table}_document_id_idx ON {table_name} (document_id)"),
        format!("CREATE INDEX IF NOT EXISTS {table}_chunk_kind_idx ON {table_name} (chunk_kind)"),
    ]
}

/// `schema.` when `table_name` is schema-qualified, else empty.
fn schema_prefix<'a>(table_name: &'a str, table: &str) -> &'a str {
    table_name.strip_suffix(table).unwrap_or("")
}

/// Top-`k` query over an exact distance ordering. `$1` is the query vector;
/// document id and kind filters bind `$2`, `$3` in that order when present.
fn select_sql(table_name: &str, filter: &ChunkFilter, k: usize) -> String {
    let mut where_parts = Vec::new();
    let mut param_index = 2;
    if filter.document_id.is_some() {
        where_parts.push(format!("document_id = ${}", param_index));
        param_index += 1;
    }
    if filter.kind.is_some() {
        where_parts.push(format!("chunk_kind = ${}", param_index));
    }

    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_parts.join(" AND "))
    };

    format!(
        r#"
        SELECT
            id::text AS chunk_id,
            document_id,
            chunk_kind,
            chunk_index,
            title,
            url,
            content,
            token_count,
            embedding,
            created_at,
            1 - (embedding <=> $1) AS score
        FROM {}
        {}
        ORDER BY embedding <=> $1, chunk_index ASC, document_id ASC
        LIMIT {}
        "#,
        table_name, where_clause, k
    )
}
