//! Conversation memory: durable per-user turns, near-duplicate gating,
//! live session windows and history compaction.

pub mod compactor;
pub mod index;
pub mod providers;
pub mod reconciler;
pub mod session;
pub mod similarity_gate;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use compactor::{CompactionOutcome, Compactor, DEFAULT_SUMMARIZE_INSTRUCTION};
pub use index::{IndexFactory, InMemoryVectorIndex, LazyVectorIndex, VectorIndex};
pub use providers::{Agent, AgentRequest, Embedder, LanguageModel};
pub use reconciler::{HistorySource, SessionReconciler};
pub use session::{SessionMemory, SessionRegistry, SessionState, SessionStats};
pub use similarity_gate::{SimilarityGate, TurnField};
pub use store::ConversationMemoryStore;
pub use types::{
    ConversationTurn, HistoryEntry, MetadataFilter, NewRecord, RecordId, RecordMetadata,
    ScoredRecord, StoredRecord, TurnKind, CONVERSATION_TYPE,
};
