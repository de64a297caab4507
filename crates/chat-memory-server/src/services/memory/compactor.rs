use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::providers::LanguageModel;
use super::session::SessionRegistry;
use super::store::ConversationMemoryStore;
use super::types::{ConversationTurn, RecordId};
use crate::utils::MemoryError;

pub const DEFAULT_SUMMARIZE_INSTRUCTION: &str =
    "Below are the messages this user sent in earlier conversations. Summarize the main \
     requests and key facts as concisely as possible.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    NothingToSummarize,
    /// A single record is already as compact as it gets
    SingleTurn,
    Compacted { folded: usize },
}

impl CompactionOutcome {
    pub fn succeeded(self) -> bool {
        !matches!(self, CompactionOutcome::NothingToSummarize)
    }
}

/// Folds a user's stored history into one summary record.
pub struct Compactor {
    store: Arc<ConversationMemoryStore>,
    sessions: SessionRegistry,
    llm: Arc<dyn LanguageModel>,
    instruction: String,
}

impl Compactor {
    pub fn new(
        store: Arc<ConversationMemoryStore>,
        sessions: SessionRegistry,
        llm: Arc<dyn LanguageModel>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sessions,
            llm,
            instruction: instruction.into(),
        }
    }

    /// Replace all of a user's records with a single summary.
    ///
    /// `false` when there is nothing to summarize or any step failed; the
    /// failure is logged.
    pub async fn summarize_user_history(&self, user_id: &str) -> bool {
        match self.try_summarize(user_id).await {
            Ok(outcome) => {
                debug!("Compaction of user {} finished: {:?}", user_id, outcome);
                outcome.succeeded()
            }
            Err(e) => {
                error!("Compaction of user {} failed: {}", user_id, e);
                false
            }
        }
    }

    pub async fn try_summarize(&self, user_id: &str) -> Result<CompactionOutcome, MemoryError> {
        // Same critical section as a live turn of this user
        let _session = self.sessions.lock(user_id).await;

        let records = self.store.load_all(user_id).await?;
        match records.len() {
            0 => return Ok(CompactionOutcome::NothingToSummarize),
            1 => return Ok(CompactionOutcome::SingleTurn),
            _ => {}
        }

        let prompt = self.build_prompt(records.iter().map(|(_, turn)| turn));
        let summary = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| MemoryError::SummarizationFailure(e.to_string()))?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(MemoryError::SummarizationFailure(
                "model returned an empty summary".to_string(),
            ));
        }

        // Insert before delete: a crash in between leaves duplicates, never a gap
        self.store
            .insert(&ConversationTurn::summary(user_id, summary, Utc::now()))
            .await?;

        let old_ids: Vec<RecordId> = records.iter().map(|(id, _)| *id).collect();
        let deleted = self.store.delete_records(&old_ids).await?;
        if deleted != old_ids.len() {
            warn!(
                "Compaction of user {} removed {} of {} records",
                user_id,
                deleted,
                old_ids.len()
            );
        }

        info!("Compacted {} records of user {} into one summary", old_ids.len(), user_id);
        Ok(CompactionOutcome::Compacted {
            folded: old_ids.len(),
        })
    }

    /// Only the user side is folded; bot replies are left out.
    fn build_prompt<'a>(&self, turns: impl Iterator<Item = &'a ConversationTurn>) -> String {
        let mut prompt = self.instruction.clone();
        for turn in turns {
            prompt.push('\n');
            prompt.push_str(&turn.user_text);
        }
        prompt
    }
}
