use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use super::traits::EmbeddingStore;
use crate::error::{DiscoveryError, Result};
use crate::models::{EmbeddingVector, ItemCategory, OriginalType, StoredEmbedding};

#[derive(Debug, sqlx::FromRow)]
struct EmbeddingRow {
    original_id: Uuid,
    embedding: String,
    source_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

/// pgvector-backed embedding storage
///
/// Vectors cross the wire in text form: bound as `$n::text::vector`, read as
/// `embedding::text`.
#[derive(Clone)]
pub struct PgEmbeddingStore {
    pool: PgPool,
}

impl PgEmbeddingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmbeddingStore for PgEmbeddingStore {
    async fn get(
        &self,
        original_id: Uuid,
        original_type: OriginalType,
    ) -> Result<Option<StoredEmbedding>> {
        let row = sqlx::query_as::<_, EmbeddingRow>(
            r#"
            SELECT original_id, embedding::text AS embedding, source_at, updated_at
            FROM embedding
            WHERE original_id = $1 AND original_type = $2
            "#,
        )
        .bind(original_id)
        .bind(original_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let embedding = EmbeddingVector::parse_literal(&row.embedding).map_err(|e| {
            DiscoveryError::StorageUnavailable(format!(
                "stored {} embedding for {} is malformed: {}",
                original_type, row.original_id, e
            ))
        })?;

        Ok(Some(StoredEmbedding {
            original_id: row.original_id,
            original_type,
            embedding,
            source_at: row.source_at,
            updated_at: row.updated_at,
        }))
    }

    async fn replace(
        &self,
        original_id: Uuid,
        original_type: OriginalType,
        embedding: &EmbeddingVector,
        source_at: DateTime<Utc>,
    ) -> Result<bool> {
        // Older synthesis runs never overwrite a newer one
        let result = sqlx::query(
            r#"
            INSERT INTO embedding (original_id, original_type, embedding, source_at, updated_at)
            VALUES ($1, $2, $3::text::vector, $4, NOW())
            ON CONFLICT (original_id, original_type) DO UPDATE
            SET embedding = EXCLUDED.embedding,
                source_at = EXCLUDED.source_at,
                updated_at = NOW()
            WHERE embedding.source_at IS NULL
               OR embedding.source_at <= EXCLUDED.source_at
            "#,
        )
        .bind(original_id)
        .bind(original_type.as_str())
        .bind(embedding.to_literal())
        .bind(source_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(
        &self,
        original_id: Uuid,
        original_type: OriginalType,
        source_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM embedding
            WHERE original_id = $1
              AND original_type = $2
              AND (source_at IS NULL OR source_at <= $3)
            "#,
        )
        .bind(original_id)
        .bind(original_type.as_str())
        .bind(source_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn nearest(
        &self,
        query: &EmbeddingVector,
        original_type: OriginalType,
        limit: i64,
    ) -> Result<Vec<(Uuid, f64)>> {
        let rows = sqlx::query_as::<_, (Uuid, f64)>(
            r#"
            SELECT original_id, (embedding <=> $1::text::vector)::float8 AS cosine_distance
            FROM embedding
            WHERE original_type = $2
            ORDER BY embedding <=> $1::text::vector ASC, original_id ASC
            LIMIT $3
            "#,
        )
        .bind(query.to_literal())
        .bind(original_type.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn category_references(&self) -> Result<HashMap<ItemCategory, EmbeddingVector>> {
        let rows = sqlx::query_as::<_, (i32, String)>(
            r#"
            SELECT item_category, embedding::text
            FROM category_embedding
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut references = HashMap::with_capacity(rows.len());
        for (code, literal) in rows {
            let Some(category) = ItemCategory::from_code(code) else {
                warn!(code, "Reference embedding for unknown category code, skipping");
                continue;
            };
            match EmbeddingVector::parse_literal(&literal) {
                Ok(vector) => {
                    references.insert(category, vector);
                }
                Err(e) => warn!(
                    category = %category,
                    error = %e,
                    "Malformed reference embedding, skipping"
                ),
            }
        }

        Ok(references)
    }
}
