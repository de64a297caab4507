use sqlx::FromRow;
use uuid::Uuid;

use crate::services::memory::{RecordMetadata, ScoredRecord, StoredRecord};

#[derive(Debug, Clone, FromRow)]
pub struct ConversationRecordRow {
    pub id: Uuid,
    pub content: String,
    pub user_id: String,
    pub record_type: String,
    pub recorded_at: String,
}

impl From<ConversationRecordRow> for StoredRecord {
    fn from(row: ConversationRecordRow) -> Self {
        StoredRecord {
            id: row.id,
            content: row.content,
            metadata: RecordMetadata {
                user_id: row.user_id,
                record_type: row.record_type,
                timestamp: row.recorded_at,
            },
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ScoredRecordRow {
    #[sqlx(flatten)]
    pub record: ConversationRecordRow,
    pub similarity: f64,
}

impl From<ScoredRecordRow> for ScoredRecord {
    fn from(row: ScoredRecordRow) -> Self {
        ScoredRecord {
            record: row.record.into(),
            similarity: row.similarity as f32,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MetadataRow {
    pub user_id: String,
    pub record_type: String,
    pub recorded_at: String,
}

impl From<MetadataRow> for RecordMetadata {
    fn from(row: MetadataRow) -> Self {
        RecordMetadata {
            user_id: row.user_id,
            record_type: row.record_type,
            timestamp: row.recorded_at,
        }
    }
}
