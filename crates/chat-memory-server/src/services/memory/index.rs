use anyhow::Result;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{MetadataFilter, NewRecord, RecordId, RecordMetadata, ScoredRecord, StoredRecord};
use crate::utils::cosine_similarity;

/// Contract of the vector store holding conversation records
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    async fn add(&self, record: NewRecord) -> Result<RecordId>;

    /// Nearest neighbours of `vector` among records matching `filter`, best first.
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRecord>>;

    /// Records matching `filter`, newest first by metadata timestamp.
    async fn get(&self, filter: &MetadataFilter, limit: Option<usize>) -> Result<Vec<StoredRecord>>;

    /// Returns the number of deleted records.
    async fn delete(&self, filter: &MetadataFilter) -> Result<usize>;

    async fn delete_ids(&self, ids: &[RecordId]) -> Result<usize>;

    async fn list_metadata(&self, filter: &MetadataFilter) -> Result<Vec<RecordMetadata>>;

    /// Release backing resources
    async fn close(&self) {}
}

struct IndexedRecord {
    record: StoredRecord,
    vector: Vec<f32>,
}

/// Brute-force index kept in process memory
#[derive(Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<Vec<IndexedRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait::async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, record: NewRecord) -> Result<RecordId> {
        let id = Uuid::new_v4();
        self.records.write().push(IndexedRecord {
            record: StoredRecord {
                id,
                content: record.content,
                metadata: record.metadata,
            },
            vector: record.vector,
        });
        Ok(id)
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRecord>> {
        let records = self.records.read();

        let mut scored = Vec::new();
        for entry in records.iter().filter(|r| filter.matches(&r.record.metadata)) {
            let similarity = cosine_similarity(vector, &entry.vector)?;
            scored.push(ScoredRecord {
                record: entry.record.clone(),
                similarity,
            });
        }

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(k);
        Ok(scored)
    }

    async fn get(&self, filter: &MetadataFilter, limit: Option<usize>) -> Result<Vec<StoredRecord>> {
        let records = self.records.read();

        let mut matched: Vec<StoredRecord> = records
            .iter()
            .filter(|r| filter.matches(&r.record.metadata))
            .map(|r| r.record.clone())
            .collect();

        matched.sort_by(|a, b| b.metadata.timestamp.cmp(&a.metadata.timestamp));
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| !filter.matches(&r.record.metadata));
        Ok(before - records.len())
    }

    async fn delete_ids(&self, ids: &[RecordId]) -> Result<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| !ids.contains(&r.record.id));
        Ok(before - records.len())
    }

    async fn list_metadata(&self, filter: &MetadataFilter) -> Result<Vec<RecordMetadata>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| filter.matches(&r.record.metadata))
            .map(|r| r.record.metadata.clone())
            .collect())
    }
}

pub type IndexFactory =
    Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn VectorIndex>>> + Send + Sync>;

/// Process-wide index built on first use.
///
/// Concurrent first callers wait on the same initialisation; a failed
/// initialisation leaves the cell empty so the next call retries.
pub struct LazyVectorIndex {
    cell: OnceCell<Arc<dyn VectorIndex>>,
    factory: IndexFactory,
}

impl LazyVectorIndex {
    pub fn new(factory: IndexFactory) -> Self {
        Self {
            cell: OnceCell::new(),
            factory,
        }
    }

    async fn index(&self) -> Result<&Arc<dyn VectorIndex>> {
        self.cell
            .get_or_try_init(|| async {
                info!("Initializing vector index");
                let index = (self.factory)().await?;
                info!("Vector index ready");
                Ok::<_, anyhow::Error>(index)
            })
            .await
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Close the backing index if it was ever built.
    pub async fn shutdown(&self) {
        if let Some(index) = self.cell.get() {
            debug!("Closing vector index");
            index.close().await;
        }
    }
}

#[async_trait::async_trait]
impl VectorIndex for LazyVectorIndex {
    async fn add(&self, record: NewRecord) -> Result<RecordId> {
        self.index().await?.add(record).await
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRecord>> {
        self.index().await?.search(vector, k, filter).await
    }

    async fn get(&self, filter: &MetadataFilter, limit: Option<usize>) -> Result<Vec<StoredRecord>> {
        self.index().await?.get(filter, limit).await
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<usize> {
        self.index().await?.delete(filter).await
    }

    async fn delete_ids(&self, ids: &[RecordId]) -> Result<usize> {
        self.index().await?.delete_ids(ids).await
    }

    async fn list_metadata(&self, filter: &MetadataFilter) -> Result<Vec<RecordMetadata>> {
        self.index().await?.list_metadata(filter).await
    }

    async fn close(&self) {
        self.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::types::CONVERSATION_TYPE;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(user_id: &str, timestamp: &str, vector: Vec<f32>) -> NewRecord {
        NewRecord {
            content: format!("{}@{}", user_id, timestamp),
            metadata: RecordMetadata {
                user_id: user_id.to_string(),
                record_type: CONVERSATION_TYPE.to_string(),
                timestamp: timestamp.to_string(),
            },
            vector,
        }
    }

    #[tokio::test]
    async fn test_search_is_filtered_and_ranked() {
        let index = InMemoryVectorIndex::new();
        index.add(record("u1", "t1", vec![1.0, 0.0])).await.unwrap();
        index.add(record("u1", "t2", vec![0.7, 0.7])).await.unwrap();
        index.add(record("u1", "t3", vec![0.0, 1.0])).await.unwrap();
        index.add(record("u2", "t4", vec![1.0, 0.0])).await.unwrap();

        let hits = index
            .search(&[1.0, 0.0], 2, &MetadataFilter::conversations_of("u1"))
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.metadata.timestamp, "t1");
        assert_eq!(hits[1].record.metadata.timestamp, "t2");
        assert!(hits.iter().all(|h| h.record.metadata.user_id == "u1"));
    }

    #[tokio::test]
    async fn test_get_is_newest_first_with_limit() {
        let index = InMemoryVectorIndex::new();
        for ts in ["2025-01-01", "2025-01-03", "2025-01-02"] {
            index.add(record("u1", ts, vec![1.0])).await.unwrap();
        }

        let records = index
            .get(&MetadataFilter::conversations_of("u1"), Some(2))
            .await
            .unwrap();
        let stamps: Vec<_> = records.iter().map(|r| r.metadata.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["2025-01-03", "2025-01-02"]);
    }

    #[tokio::test]
    async fn test_delete_by_filter_and_by_id() {
        let index = InMemoryVectorIndex::new();
        let keep = index.add(record("u1", "t1", vec![1.0])).await.unwrap();
        let drop_id = index.add(record("u1", "t2", vec![1.0])).await.unwrap();
        index.add(record("u2", "t3", vec![1.0])).await.unwrap();

        assert_eq!(index.delete_ids(&[drop_id]).await.unwrap(), 1);
        assert_eq!(index.len(), 2);

        assert_eq!(index.delete(&MetadataFilter::conversations_of("u2")).await.unwrap(), 1);
        let remaining = index.get(&MetadataFilter::default(), None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep);
    }

    #[tokio::test]
    async fn test_lazy_index_initializes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = Arc::new(LazyVectorIndex::new(Box::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(Arc::new(InMemoryVectorIndex::new()) as Arc<dyn VectorIndex>)
            }
            .boxed()
        })));

        assert!(!lazy.is_initialized());

        let mut handles = Vec::new();
        for i in 0..8 {
            let lazy = lazy.clone();
            handles.push(tokio::spawn(async move {
                lazy.add(record("u1", &format!("t{}", i), vec![1.0])).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(lazy.is_initialized());
        let all = lazy.get(&MetadataFilter::conversations(), None).await.unwrap();
        assert_eq!(all.len(), 8);
    }

    #[tokio::test]
    async fn test_lazy_index_retries_failed_init() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let lazy = LazyVectorIndex::new(Box::new(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    anyhow::bail!("database not reachable");
                }
                Ok(Arc::new(InMemoryVectorIndex::new()) as Arc<dyn VectorIndex>)
            }
            .boxed()
        }));

        assert!(lazy.get(&MetadataFilter::conversations(), None).await.is_err());
        assert!(!lazy.is_initialized());
        assert!(lazy.get(&MetadataFilter::conversations(), None).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
