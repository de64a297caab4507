use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::services::memory::HistoryEntry;

// ===== LLM MESSAGES =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user" or "assistant"
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub chat_history: Option<CallerHistory>,
    #[serde(default = "default_use_history")]
    pub use_history: bool,
}

fn default_use_history() -> bool {
    true
}

/// History a caller may attach to a chat request.
///
/// Accepted as a list of `{user, bot}`, as `{"history": [...]}`, or as a
/// JSON string holding either of those.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CallerHistory {
    Entries(Vec<HistoryEntry>),
    Wrapped { history: Vec<HistoryEntry> },
    Encoded(String),
    Other(serde_json::Value),
}

impl CallerHistory {
    /// Malformed history is logged and treated as absent.
    pub fn into_entries(self) -> Option<Vec<HistoryEntry>> {
        match self {
            CallerHistory::Entries(entries) | CallerHistory::Wrapped { history: entries } => {
                Some(entries)
            }
            CallerHistory::Encoded(raw) => match serde_json::from_str::<CallerHistory>(&raw) {
                Ok(CallerHistory::Encoded(_)) | Ok(CallerHistory::Other(_)) | Err(_) => {
                    warn!("Ignoring unparseable chat_history string");
                    None
                }
                Ok(decoded) => decoded.into_entries(),
            },
            CallerHistory::Other(value) => {
                warn!("Ignoring chat_history of unexpected shape: {}", value);
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub data: Vec<TurnView>,
}

#[derive(Debug, Serialize)]
pub struct TurnView {
    pub user: String,
    pub bot: String,
    pub timestamp: String,
    pub kind: crate::services::memory::TurnKind,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub success: bool,
    pub data: Vec<String>,
}
