use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::models::chat::ChatMessage;
use crate::services::llm_service::LlmService;
use crate::services::memory::{Agent, AgentRequest, HistoryEntry};

/// Support agent answering through the chat completion endpoint
pub struct ChatAgent {
    llm: Arc<LlmService>,
    system_prompt: String,
}

impl ChatAgent {
    pub fn new(llm: Arc<LlmService>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    /// System prompt, then each exchange oldest first, then the question.
    pub fn build_messages(&self, question: &str, history: &[HistoryEntry]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        messages.push(ChatMessage::system(self.system_prompt.as_str()));

        for entry in history {
            messages.push(ChatMessage::user(entry.user.as_str()));
            // Summaries have no reply side
            if !entry.bot.is_empty() {
                messages.push(ChatMessage::assistant(entry.bot.as_str()));
            }
        }

        messages.push(ChatMessage::user(question));
        messages
    }
}

#[async_trait::async_trait]
impl Agent for ChatAgent {
    async fn run(&self, request: AgentRequest) -> Result<String> {
        debug!(
            "Running agent for {:?} with {} history entries",
            request.user_id,
            request.history.len()
        );
        let messages = self.build_messages(&request.question, &request.history);
        self.llm.generate_chat(&messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;

    #[test]
    fn test_messages_follow_history_order() {
        let llm = Arc::new(LlmService::new(LlmConfig::default()).unwrap());
        let agent = ChatAgent::new(llm, "support");

        let history = vec![
            HistoryEntry::new("asked about refunds", ""),
            HistoryEntry::new("订单状态?", "已发货"),
        ];
        let messages = agent.build_messages("退货流程?", &history);

        let roles: Vec<_> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "user", "assistant", "user"]);
        assert_eq!(messages[0].content, "support");
        assert_eq!(messages[3].content, "已发货");
        assert_eq!(messages[4].content, "退货流程?");
    }
}
