use std::sync::Arc;
use tracing::debug;

use super::index::VectorIndex;
use super::providers::Embedder;
use super::types::{ConversationTurn, MetadataFilter};
use crate::utils::{cosine_similarity, MemoryError};

/// Which side of a stored turn a candidate is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnField {
    User,
    Bot,
}

impl TurnField {
    fn pick(self, turn: &ConversationTurn) -> &str {
        match self {
            TurnField::User => &turn.user_text,
            TurnField::Bot => &turn.bot_text,
        }
    }
}

/// Near-duplicate detection against a user's stored turns
pub struct SimilarityGate {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    k: usize,
}

impl SimilarityGate {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        threshold: f32,
        k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            threshold,
            k,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Check `candidate` with the configured threshold and neighbour count.
    pub async fn is_near_duplicate(
        &self,
        user_id: &str,
        candidate: &str,
        field: TurnField,
    ) -> Result<bool, MemoryError> {
        self.is_near_duplicate_with(user_id, candidate, field, self.threshold, self.k)
            .await
    }

    /// True when one of the `k` nearest stored turns of `user_id` has a
    /// `field` text whose similarity to `candidate` is strictly above
    /// `threshold`. Read-only; errors are returned for the caller to handle.
    pub async fn is_near_duplicate_with(
        &self,
        user_id: &str,
        candidate: &str,
        field: TurnField,
        threshold: f32,
        k: usize,
    ) -> Result<bool, MemoryError> {
        let candidate_vector = self
            .embedder
            .embed(candidate)
            .await
            .map_err(|e| MemoryError::EmbeddingFailure(e.to_string()))?;

        let neighbours = self
            .index
            .search(&candidate_vector, k, &MetadataFilter::conversations_of(user_id))
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;

        for neighbour in neighbours {
            let turn = match ConversationTurn::from_record(&neighbour.record) {
                Ok(turn) => turn,
                Err(e) => {
                    debug!("Skipping unreadable neighbour: {}", e);
                    continue;
                }
            };

            let stored_text = field.pick(&turn);
            // Summaries carry no bot text
            if stored_text.is_empty() {
                continue;
            }

            let stored_vector = self
                .embedder
                .embed(stored_text)
                .await
                .map_err(|e| MemoryError::EmbeddingFailure(e.to_string()))?;

            let similarity = cosine_similarity(&candidate_vector, &stored_vector)
                .map_err(|e| MemoryError::EmbeddingFailure(e.to_string()))?;

            if similarity > threshold {
                debug!(
                    "Near-duplicate for user {} (similarity {:.4} > {:.4})",
                    user_id, similarity, threshold
                );
                return Ok(true);
            }
        }

        Ok(false)
    }
}
