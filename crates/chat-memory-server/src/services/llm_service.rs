use crate::config::LlmConfig;
use crate::models::chat::ChatMessage;
use crate::services::memory::LanguageModel;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub messages: &'a [ChatMessage],
    pub max_tokens: usize,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

/// Client for an OpenAI compatible `/v1/chat/completions` endpoint
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build LLM HTTP client")?;

        Ok(Self { client, config })
    }

    /// Generate completion without streaming (wait for full response)
    pub async fn generate_chat(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!("Starting chat generation with {} messages", messages.len());

        let request = ChatCompletionRequest {
            model: self.config.model.as_deref(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        let mut builder = self
            .client
            .post(format!(
                "{}/v1/chat/completions",
                self.config.base_url.trim_end_matches('/')
            ))
            .json(&request);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.context("Failed to call LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error: {} - {}", status, body);
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No choices returned from LLM"))
    }
}

#[async_trait::async_trait]
impl LanguageModel for LlmService {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_chat(&[ChatMessage::user(prompt)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let request = ChatCompletionRequest {
            model: None,
            messages: &messages,
            max_tokens: 64,
            temperature: 0.5,
            stream: false,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("model").is_none());
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["stream"], false);
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
    }
}
