use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::index::InMemoryVectorIndex;
use super::providers::{Agent, AgentRequest, Embedder};
use super::similarity_gate::SimilarityGate;
use super::store::ConversationMemoryStore;

pub const DIM: usize = 64;

/// Bag-of-characters embedding: identical texts map to identical vectors,
/// texts sharing few characters land far apart.
pub struct CharHashEmbedder {
    failing: AtomicBool,
}

impl CharHashEmbedder {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

pub fn char_hash_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIM];
    for ch in text.chars() {
        vector[(ch as usize) % DIM] += 1.0;
    }
    vector
}

#[async_trait::async_trait]
impl Embedder for CharHashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("embedding server unreachable");
        }
        Ok(char_hash_vector(text))
    }
}

/// Fixed text-to-vector table, falling back to the character hash.
pub struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    pub fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.clone()))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| char_hash_vector(text)))
    }
}

/// Agent double that answers `reply:<question>` and records what it saw.
#[derive(Default)]
pub struct RecordingAgent {
    pub requests: Mutex<Vec<AgentRequest>>,
}

#[async_trait::async_trait]
impl Agent for RecordingAgent {
    async fn run(&self, request: AgentRequest) -> Result<String> {
        let reply = format!("reply:{}", request.question);
        self.requests.lock().push(request);
        Ok(reply)
    }
}

pub struct Fixture {
    pub index: Arc<InMemoryVectorIndex>,
    pub embedder: Arc<CharHashEmbedder>,
    pub store: Arc<ConversationMemoryStore>,
}

pub fn fixture() -> Fixture {
    let index = Arc::new(InMemoryVectorIndex::new());
    let embedder = Arc::new(CharHashEmbedder::new());
    let gate = SimilarityGate::new(index.clone(), embedder.clone(), 0.8, 3);
    let store = Arc::new(ConversationMemoryStore::new(
        index.clone(),
        embedder.clone(),
        gate,
        100,
    ));
    Fixture {
        index,
        embedder,
        store,
    }
}
