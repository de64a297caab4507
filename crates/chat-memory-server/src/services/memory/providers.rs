//! Collaborator seams of the memory subsystem.
//!
//! Implementations live in `services` (HTTP-backed) and in the test doubles;
//! the memory core only ever sees these traits.

use anyhow::Result;

use super::types::HistoryEntry;

/// Trait for the embedding model
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Trait for plain prompt-in, text-out generation
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Everything the agent gets for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    pub question: String,
    /// Chronological, oldest first
    pub history: Vec<HistoryEntry>,
    pub user_id: Option<String>,
}

/// Trait for the conversational agent that produces replies
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    async fn run(&self, request: AgentRequest) -> Result<String>;
}
