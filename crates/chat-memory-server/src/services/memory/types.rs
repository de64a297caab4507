use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::MemoryError;

/// Metadata `type` value carried by every turn record, summaries included.
pub const CONVERSATION_TYPE: &str = "conversation";

pub type RecordId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Conversation,
    /// Compacted record; persisted as a conversation record with an empty bot reply
    Summary,
}

/// One stored exchange, as read back from the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub user_id: String,
    pub user_text: String,
    pub bot_text: String,
    pub timestamp: DateTime<Utc>,
    pub kind: TurnKind,
}

/// Serialized record content: `{"user", "bot", "timestamp"}`.
#[derive(Debug, Serialize, Deserialize)]
struct TurnPayload {
    user: String,
    bot: String,
    timestamp: String,
}

impl ConversationTurn {
    pub fn conversation(
        user_id: impl Into<String>,
        user_text: impl Into<String>,
        bot_text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_text: user_text.into(),
            bot_text: bot_text.into(),
            timestamp,
            kind: TurnKind::Conversation,
        }
    }

    pub fn summary(
        user_id: impl Into<String>,
        summary_text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_text: summary_text.into(),
            bot_text: String::new(),
            timestamp,
            kind: TurnKind::Summary,
        }
    }

    pub fn content(&self) -> Result<String, MemoryError> {
        let payload = TurnPayload {
            user: self.user_text.clone(),
            bot: self.bot_text.clone(),
            timestamp: format_timestamp(&self.timestamp),
        };
        serde_json::to_string(&payload).map_err(|e| MemoryError::ParseFailure(e.to_string()))
    }

    pub fn metadata(&self) -> RecordMetadata {
        RecordMetadata {
            user_id: self.user_id.clone(),
            record_type: CONVERSATION_TYPE.to_string(),
            timestamp: format_timestamp(&self.timestamp),
        }
    }

    /// Rebuild a turn from a stored record.
    pub fn from_record(record: &StoredRecord) -> Result<Self, MemoryError> {
        let payload: TurnPayload = serde_json::from_str(&record.content)
            .map_err(|e| MemoryError::ParseFailure(format!("record {}: {}", record.id, e)))?;

        let timestamp = parse_timestamp(&payload.timestamp)
            .or_else(|_| parse_timestamp(&record.metadata.timestamp))?;

        // Conversation turns are never saved with an empty answer
        let kind = if payload.bot.is_empty() {
            TurnKind::Summary
        } else {
            TurnKind::Conversation
        };

        Ok(Self {
            user_id: record.metadata.user_id.clone(),
            user_text: payload.user,
            bot_text: payload.bot,
            timestamp,
            kind,
        })
    }

    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            user: self.user_text.clone(),
            bot: self.bot_text.clone(),
        }
    }
}

/// Fixed-width UTC timestamps so lexicographic and chronological order agree.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 and offset-less ISO-8601 (read as UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MemoryError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| MemoryError::ParseFailure(format!("bad timestamp {:?}: {}", raw, e)))
}

/// One `{user, bot}` exchange as seen by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user: String,
    pub bot: String,
}

impl HistoryEntry {
    pub fn new(user: impl Into<String>, bot: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            bot: bot.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub user_id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub timestamp: String,
}

/// Record handed to the index for insertion.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub content: String,
    pub metadata: RecordMetadata,
    pub vector: Vec<f32>,
}

/// Record as returned by the index (vector omitted).
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub content: String,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: StoredRecord,
    pub similarity: f32,
}

/// Exact-match metadata filter; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub user_id: Option<String>,
    pub record_type: Option<String>,
}

impl MetadataFilter {
    pub fn conversations() -> Self {
        Self {
            user_id: None,
            record_type: Some(CONVERSATION_TYPE.to_string()),
        }
    }

    pub fn conversations_of(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            record_type: Some(CONVERSATION_TYPE.to_string()),
        }
    }

    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        self.user_id.as_ref().map_or(true, |u| *u == metadata.user_id)
            && self
                .record_type
                .as_ref()
                .map_or(true, |t| *t == metadata.record_type)
    }
}
