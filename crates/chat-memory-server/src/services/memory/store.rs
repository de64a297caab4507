use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::index::VectorIndex;
use super::providers::Embedder;
use super::similarity_gate::{SimilarityGate, TurnField};
use super::types::{ConversationTurn, MetadataFilter, NewRecord, RecordId};
use crate::utils::MemoryError;

/// Shared, durable store of every user's conversation turns.
///
/// The only component that reads or writes conversation records in the
/// vector index.
pub struct ConversationMemoryStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    gate: SimilarityGate,
    recent_limit: usize,
}

impl ConversationMemoryStore {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        gate: SimilarityGate,
        recent_limit: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            gate,
            recent_limit,
        }
    }

    pub fn recent_limit(&self) -> usize {
        self.recent_limit
    }

    /// Persist one exchange unless either side is a near-duplicate of
    /// something already stored for the user.
    ///
    /// Returns `Ok(false)` when the turn was suppressed. A failing duplicate
    /// check is treated as "not a duplicate".
    pub async fn save_turn(
        &self,
        user_id: &str,
        user_text: &str,
        bot_text: &str,
    ) -> Result<bool, MemoryError> {
        self.save_turn_at(user_id, user_text, bot_text, Utc::now()).await
    }

    pub(crate) async fn save_turn_at(
        &self,
        user_id: &str,
        user_text: &str,
        bot_text: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, MemoryError> {
        // An empty bot side is what marks a summary record
        if bot_text.trim().is_empty() {
            warn!("Empty answer for user {}, not saving turn", user_id);
            return Ok(false);
        }

        if self.check_duplicate(user_id, user_text, TurnField::User).await {
            debug!("Similar question already stored for user {}, skipping save", user_id);
            return Ok(false);
        }

        if self.check_duplicate(user_id, bot_text, TurnField::Bot).await {
            debug!("Similar answer already stored for user {}, skipping save", user_id);
            return Ok(false);
        }

        let turn = ConversationTurn::conversation(user_id, user_text, bot_text, timestamp);
        self.insert(&turn).await?;
        debug!("Saved turn for user {}", user_id);
        Ok(true)
    }

    async fn check_duplicate(&self, user_id: &str, text: &str, field: TurnField) -> bool {
        match self.gate.is_near_duplicate(user_id, text, field).await {
            Ok(duplicate) => duplicate,
            Err(e) => {
                warn!("Duplicate check failed for user {} ({:?}), saving anyway: {}", user_id, field, e);
                false
            }
        }
    }

    /// Write a turn without duplicate checks.
    pub(crate) async fn insert(&self, turn: &ConversationTurn) -> Result<RecordId, MemoryError> {
        let content = turn.content()?;
        let vector = self
            .embedder
            .embed(&content)
            .await
            .map_err(|e| MemoryError::EmbeddingFailure(e.to_string()))?;

        self.index
            .add(NewRecord {
                content,
                metadata: turn.metadata(),
                vector,
            })
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))
    }

    /// Most recent turns of a user, newest first, at most `limit`.
    pub async fn load_recent(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, MemoryError> {
        let mut turns: Vec<ConversationTurn> = self
            .load_records(user_id, Some(limit))
            .await?
            .into_iter()
            .map(|(_, turn)| turn)
            .collect();

        turns.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        turns.truncate(limit);
        Ok(turns)
    }

    /// [`Self::load_recent`] with the configured default limit.
    pub async fn load_recent_default(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationTurn>, MemoryError> {
        self.load_recent(user_id, self.recent_limit).await
    }

    /// Every turn of a user with its record id, oldest first.
    pub(crate) async fn load_all(
        &self,
        user_id: &str,
    ) -> Result<Vec<(RecordId, ConversationTurn)>, MemoryError> {
        let mut records = self.load_records(user_id, None).await?;
        records.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp));
        Ok(records)
    }

    async fn load_records(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(RecordId, ConversationTurn)>, MemoryError> {
        let records = self
            .index
            .get(&MetadataFilter::conversations_of(user_id), limit)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;

        let total = records.len();
        let turns: Vec<(RecordId, ConversationTurn)> = records
            .iter()
            .filter_map(|record| match ConversationTurn::from_record(record) {
                Ok(turn) => Some((record.id, turn)),
                Err(e) => {
                    warn!("Skipping malformed record: {}", e);
                    None
                }
            })
            .collect();

        debug!("Loaded {}/{} records for user {}", turns.len(), total, user_id);
        Ok(turns)
    }

    /// Delete all conversation records of a user.
    pub async fn delete_user_history(&self, user_id: &str) -> Result<bool, MemoryError> {
        let deleted = self
            .index
            .delete(&MetadataFilter::conversations_of(user_id))
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;

        info!("Deleted {} records of user {}", deleted, user_id);
        Ok(true)
    }

    pub(crate) async fn delete_records(&self, ids: &[RecordId]) -> Result<usize, MemoryError> {
        self.index
            .delete_ids(ids)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))
    }

    /// Cheap round trip to the index; builds it on first call.
    pub async fn is_reachable(&self) -> bool {
        match self.index.get(&MetadataFilter::conversations(), Some(1)).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Vector index unreachable: {}", e);
                false
            }
        }
    }

    /// Distinct user ids owning at least one conversation record.
    pub async fn list_user_ids(&self) -> Result<BTreeSet<String>, MemoryError> {
        let metadata = self
            .index
            .list_metadata(&MetadataFilter::conversations())
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;

        Ok(metadata.into_iter().map(|m| m.user_id).collect())
    }
}
