use anyhow::{Context, Result};
use pgvector::Vector;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::{ConversationRecordRow, MetadataRow, ScoredRecordRow};
use super::DbPool;
use crate::services::memory::{
    MetadataFilter, NewRecord, RecordId, RecordMetadata, ScoredRecord, StoredRecord, VectorIndex,
};

// A NULL filter parameter matches every row
const FILTER_CLAUSE: &str = "($1::text IS NULL OR user_id = $1) \
     AND ($2::text IS NULL OR record_type = $2)";

/// Conversation records in Postgres, searched with pgvector cosine distance
pub struct PgVectorIndex {
    pool: DbPool,
    dimension: usize,
}

impl PgVectorIndex {
    pub fn new(pool: DbPool, dimension: usize) -> Self {
        Self { pool, dimension }
    }

    /// Connect and make sure the table exists.
    pub async fn connect(pool: DbPool, dimension: usize) -> Result<Self> {
        let index = Self::new(pool, dimension);
        index.ensure_schema().await?;
        Ok(index)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        let pool = self.pool.get_pool();

        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(pool)
            .await
            .context("Failed to enable pgvector extension")?;

        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS conversation_records (
                id UUID PRIMARY KEY,
                content TEXT NOT NULL,
                user_id TEXT NOT NULL,
                record_type TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                embedding vector({}) NOT NULL
            )"#,
            self.dimension
        ))
        .execute(pool)
        .await
        .context("Failed to create conversation_records table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversation_records_user \
             ON conversation_records (user_id, recorded_at DESC)",
        )
        .execute(pool)
        .await?;

        info!("conversation_records schema ready (dimension {})", self.dimension);
        Ok(())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            anyhow::bail!(
                "Vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            );
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorIndex for PgVectorIndex {
    async fn add(&self, record: NewRecord) -> Result<RecordId> {
        self.check_dimension(&record.vector)?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"INSERT INTO conversation_records
                (id, content, user_id, record_type, recorded_at, embedding)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(id)
        .bind(&record.content)
        .bind(&record.metadata.user_id)
        .bind(&record.metadata.record_type)
        .bind(&record.metadata.timestamp)
        .bind(Vector::from(record.vector))
        .execute(self.pool.get_pool())
        .await
        .context("Failed to insert conversation record")?;

        debug!("Inserted record {} for user {}", id, record.metadata.user_id);
        Ok(id)
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRecord>> {
        self.check_dimension(vector)?;

        let rows = sqlx::query_as::<_, ScoredRecordRow>(&format!(
            r#"SELECT id, content, user_id, record_type, recorded_at,
                      1 - (embedding <=> $3) AS similarity
               FROM conversation_records
               WHERE {}
               ORDER BY embedding <=> $3
               LIMIT $4"#,
            FILTER_CLAUSE
        ))
        .bind(filter.user_id.as_deref())
        .bind(filter.record_type.as_deref())
        .bind(Vector::from(vector.to_vec()))
        .bind(k as i64)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.into_iter().map(ScoredRecord::from).collect())
    }

    async fn get(&self, filter: &MetadataFilter, limit: Option<usize>) -> Result<Vec<StoredRecord>> {
        // LIMIT NULL is no limit
        let rows = sqlx::query_as::<_, ConversationRecordRow>(&format!(
            r#"SELECT id, content, user_id, record_type, recorded_at
               FROM conversation_records
               WHERE {}
               ORDER BY recorded_at DESC
               LIMIT $3"#,
            FILTER_CLAUSE
        ))
        .bind(filter.user_id.as_deref())
        .bind(filter.record_type.as_deref())
        .bind(limit.map(|l| l as i64))
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.into_iter().map(StoredRecord::from).collect())
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<usize> {
        let result = sqlx::query(&format!(
            "DELETE FROM conversation_records WHERE {}",
            FILTER_CLAUSE
        ))
        .bind(filter.user_id.as_deref())
        .bind(filter.record_type.as_deref())
        .execute(self.pool.get_pool())
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn delete_ids(&self, ids: &[RecordId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM conversation_records WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(self.pool.get_pool())
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn list_metadata(&self, filter: &MetadataFilter) -> Result<Vec<RecordMetadata>> {
        let rows = sqlx::query_as::<_, MetadataRow>(&format!(
            "SELECT user_id, record_type, recorded_at FROM conversation_records WHERE {}",
            FILTER_CLAUSE
        ))
        .bind(filter.user_id.as_deref())
        .bind(filter.record_type.as_deref())
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.into_iter().map(RecordMetadata::from).collect())
    }

    async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }
}
