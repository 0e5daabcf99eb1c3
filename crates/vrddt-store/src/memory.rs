//! In-memory content store with the same uniqueness rules as production.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;
use vrddt_models::{ResultVideoRecord, SourceVideoRecord};

use crate::error::{StoreError, StoreResult};
use crate::selector::Selector;
use crate::store::ContentStore;

#[derive(Default)]
pub struct MemoryStore {
    sources: RwLock<Vec<SourceVideoRecord>>,
    results: RwLock<Vec<ResultVideoRecord>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `cleanup` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn source_count(&self) -> usize {
        self.sources.read().await.len()
    }

    pub async fn result_count(&self) -> usize {
        self.results.read().await.len()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::unavailable("memory store is closed"));
        }
        Ok(())
    }
}

fn matching<'a, T: Serialize>(
    records: &'a [T],
    selector: &'a Selector,
) -> impl Iterator<Item = &'a T> + 'a {
    records.iter().filter(move |r| {
        serde_json::to_value(r)
            .map(|v| selector.matches(&v))
            .unwrap_or(false)
    })
}

fn remove_matching<T: Serialize>(records: &mut Vec<T>, selector: &Selector) -> u64 {
    let before = records.len();
    records.retain(|r| {
        !serde_json::to_value(r)
            .map(|v| selector.matches(&v))
            .unwrap_or(false)
    });
    (before - records.len()) as u64
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn init(&self) -> StoreResult<()> {
        self.ensure_open()
    }

    async fn cleanup(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        debug!("Memory store closed");
        Ok(())
    }

    async fn create_source_video(&self, record: &SourceVideoRecord) -> StoreResult<()> {
        self.ensure_open()?;
        let mut sources = self.sources.write().await;
        if sources.iter().any(|r| r.url == record.url) {
            return Err(StoreError::already_exists(format!("source url {}", record.url)));
        }
        if sources.iter().any(|r| r.id == record.id) {
            return Err(StoreError::already_exists(format!("source id {}", record.id)));
        }
        sources.push(record.clone());
        Ok(())
    }

    async fn find_source_video(&self, selector: &Selector) -> StoreResult<SourceVideoRecord> {
        self.ensure_open()?;
        let sources = self.sources.read().await;
        let found = matching(&sources, selector).next().cloned();
        found.ok_or_else(|| StoreError::not_found(format!("source video {}", selector)))
    }

    async fn find_source_videos(
        &self,
        selector: &Selector,
        limit: usize,
    ) -> StoreResult<Vec<SourceVideoRecord>> {
        self.ensure_open()?;
        let sources = self.sources.read().await;
        let found = matching(&sources, selector).take(limit).cloned().collect();
        Ok(found)
    }

    async fn delete_source_videos(&self, selector: &Selector) -> StoreResult<u64> {
        self.ensure_open()?;
        Ok(remove_matching(&mut *self.sources.write().await, selector))
    }

    async fn create_result_video(&self, record: &ResultVideoRecord) -> StoreResult<()> {
        self.ensure_open()?;
        let mut results = self.results.write().await;
        if results.iter().any(|r| r.content_hash == record.content_hash) {
            return Err(StoreError::already_exists(format!("result md5 {}", record.content_hash)));
        }
        if results.iter().any(|r| r.id == record.id) {
            return Err(StoreError::already_exists(format!("result id {}", record.id)));
        }
        results.push(record.clone());
        Ok(())
    }

    async fn find_result_video(&self, selector: &Selector) -> StoreResult<ResultVideoRecord> {
        self.ensure_open()?;
        let results = self.results.read().await;
        let found = matching(&results, selector).next().cloned();
        found.ok_or_else(|| StoreError::not_found(format!("result video {}", selector)))
    }

    async fn find_result_videos(
        &self,
        selector: &Selector,
        limit: usize,
    ) -> StoreResult<Vec<ResultVideoRecord>> {
        self.ensure_open()?;
        let results = self.results.read().await;
        let found = matching(&results, selector).take(limit).cloned().collect();
        Ok(found)
    }

    async fn delete_result_videos(&self, selector: &Selector) -> StoreResult<u64> {
        self.ensure_open()?;
        Ok(remove_matching(&mut *self.results.write().await, selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> SourceVideoRecord {
        SourceVideoRecord::shell(url).with_streams("a", "v")
    }

    #[tokio::test]
    async fn test_unique_source_url() {
        let store = MemoryStore::new();
        store.create_source_video(&source("https://r/a")).await.unwrap();

        let err = store.create_source_video(&source("https://r/a")).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.source_count().await, 1);
    }

    #[tokio::test]
    async fn test_unique_content_hash() {
        let store = MemoryStore::new();
        store
            .create_result_video(&ResultVideoRecord::new("h1", "u1"))
            .await
            .unwrap();

        let err = store
            .create_result_video(&ResultVideoRecord::new("h1", "u2"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_find_by_streams_and_limit() {
        let store = MemoryStore::new();
        store.create_source_video(&source("https://r/a")).await.unwrap();
        store.create_source_video(&source("https://r/b")).await.unwrap();

        let all = store
            .find_source_videos(&Selector::by_streams("a", "v"), 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let one = store
            .find_source_videos(&Selector::by_streams("a", "v"), 1)
            .await
            .unwrap();
        assert_eq!(one.len(), 1);

        assert!(store
            .find_source_video(&Selector::by_streams("a", "other"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_find_results_by_hash_and_limit() {
        let store = MemoryStore::new();
        let first = ResultVideoRecord::new("h1", "u1");
        store.create_result_video(&first).await.unwrap();
        store
            .create_result_video(&ResultVideoRecord::new("h2", "u2"))
            .await
            .unwrap();

        let found = store
            .find_result_video(&Selector::by_content_hash("h1"))
            .await
            .unwrap();
        assert_eq!(found.id, first.id);

        let page = store.find_result_videos(&Selector::new(), 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(store.find_result_videos(&Selector::new(), 10).await.unwrap().len(), 2);

        assert!(store
            .find_result_video(&Selector::by_content_hash("h3"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_delete_by_selector() {
        let store = MemoryStore::new();
        let result = ResultVideoRecord::new("h1", "u1");
        store.create_result_video(&result).await.unwrap();

        let removed = store
            .delete_result_videos(&Selector::by_id(result.id.as_str()))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.result_count().await, 0);
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let store = MemoryStore::new();
        store.cleanup().await.unwrap();
        assert!(store.is_closed());
        assert!(matches!(
            store.find_source_video(&Selector::by_url("x")).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
