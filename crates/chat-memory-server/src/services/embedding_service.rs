use crate::config::EmbeddingConfig;
use crate::services::memory::Embedder;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    content: &'a str,
    // Some servers read `input` instead of `content`
    input: &'a str,
}

/// HTTP client for a llama.cpp style `/embedding` endpoint
#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    dimension: usize,
}

impl EmbeddingService {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build embedding HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            dimension: config.dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        let url = format!("{}/embedding", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                content: text,
                input: text,
            })
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = parse_embedding(&json_value)?;
        if embedding.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            );
        }

        Ok(embedding)
    }
}

fn floats(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Accepts `[..]`, `[{"embedding": [..]}]`, `{"embedding": [..]}` and
/// `{"data": [{"embedding": [..]}]}`.
fn parse_embedding(json_value: &Value) -> Result<Vec<f32>> {
    let embedding = match json_value {
        Value::Array(arr) => match arr.first() {
            None => anyhow::bail!("Empty array returned from embedding server"),
            Some(first) => match first.get("embedding") {
                Some(Value::Array(inner)) => floats(inner),
                _ => floats(arr),
            },
        },
        Value::Object(obj) => match (obj.get("embedding"), obj.get("data")) {
            (Some(Value::Array(inner)), _) => floats(inner),
            (_, Some(Value::Array(data))) => match data.first().and_then(|d| d.get("embedding")) {
                Some(Value::Array(inner)) => floats(inner),
                _ => anyhow::bail!("Unrecognized embedding response format: {}", json_value),
            },
            _ => anyhow::bail!("Unrecognized embedding response format: {}", json_value),
        },
        _ => anyhow::bail!("Unrecognized embedding response format: {}", json_value),
    };

    if embedding.is_empty() {
        anyhow::bail!("Generated embedding is empty");
    }
    Ok(embedding)
}

#[async_trait::async_trait]
impl Embedder for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request_embedding(text).await
    }
}
