//! Content store contract and backend selection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use vrddt_models::{ResultVideoRecord, SourceVideoRecord};

use crate::error::{StoreError, StoreResult};
use crate::firestore::{FirestoreConfig, FirestoreStore};
use crate::memory::MemoryStore;
use crate::selector::Selector;

/// Durable record of source and result videos.
///
/// Implementations enforce uniqueness of source `url` and result `md5`; a
/// violating create fails with [`StoreError::AlreadyExists`]. Find-one fails
/// with [`StoreError::NotFound`] when nothing matches.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Connect and declare indexes. Safe to call repeatedly.
    async fn init(&self) -> StoreResult<()>;

    /// Release the connection.
    async fn cleanup(&self) -> StoreResult<()>;

    async fn create_source_video(&self, record: &SourceVideoRecord) -> StoreResult<()>;

    async fn find_source_video(&self, selector: &Selector) -> StoreResult<SourceVideoRecord>;

    async fn find_source_videos(
        &self,
        selector: &Selector,
        limit: usize,
    ) -> StoreResult<Vec<SourceVideoRecord>>;

    /// Delete every matching source record, returning how many were removed.
    async fn delete_source_videos(&self, selector: &Selector) -> StoreResult<u64>;

    async fn create_result_video(&self, record: &ResultVideoRecord) -> StoreResult<()>;

    async fn find_result_video(&self, selector: &Selector) -> StoreResult<ResultVideoRecord>;

    async fn find_result_videos(
        &self,
        selector: &Selector,
        limit: usize,
    ) -> StoreResult<Vec<ResultVideoRecord>>;

    async fn delete_result_videos(&self, selector: &Selector) -> StoreResult<u64>;
}

/// Lookups shared by the worker, the coordinator and the API.
#[async_trait]
pub trait ContentStoreExt: ContentStore {
    /// Source record for a canonical URL, `None` when absent.
    async fn source_by_url(&self, url: &str) -> StoreResult<Option<SourceVideoRecord>> {
        optional(self.find_source_video(&Selector::by_url(url)).await)
    }

    async fn source_by_streams(
        &self,
        audio_url: &str,
        video_url: &str,
    ) -> StoreResult<Option<SourceVideoRecord>> {
        optional(
            self.find_source_video(&Selector::by_streams(audio_url, video_url))
                .await,
        )
    }

    async fn result_by_hash(&self, hash: &str) -> StoreResult<Option<ResultVideoRecord>> {
        optional(self.find_result_video(&Selector::by_content_hash(hash)).await)
    }

    /// Dereference a source record's result reference.
    ///
    /// `Ok(None)` when the record carries no reference yet; a reference that
    /// does not resolve is [`StoreError::BrokenReference`].
    async fn resolve_result(
        &self,
        source: &SourceVideoRecord,
    ) -> StoreResult<Option<ResultVideoRecord>> {
        let Some(result_id) = source.result_ref() else {
            return Ok(None);
        };

        match self.find_result_video(&Selector::by_id(result_id.as_str())).await {
            Ok(result) => Ok(Some(result)),
            Err(StoreError::NotFound(_)) => Err(StoreError::BrokenReference {
                source_id: source.id.to_string(),
                result_id: result_id.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}

impl<T: ContentStore + ?Sized> ContentStoreExt for T {}

fn optional<T>(result: StoreResult<T>) -> StoreResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Which store implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Firestore,
    Memory,
}

impl StoreBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Some(Self::Firestore),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Collection holding source records
    pub source_collection: String,
    /// Collection holding result records
    pub result_collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            source_collection: "reddit_videos".to_string(),
            result_collection: "vrddt_videos".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: std::env::var("STORE_BACKEND")
                .ok()
                .and_then(|s| StoreBackend::parse(&s))
                .unwrap_or_default(),
            source_collection: std::env::var("STORE_SOURCE_COLLECTION")
                .unwrap_or(defaults.source_collection),
            result_collection: std::env::var("STORE_RESULT_COLLECTION")
                .unwrap_or(defaults.result_collection),
        }
    }
}

/// Build the configured store. Call [`ContentStore::init`] before use.
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn ContentStore>> {
    match config.backend {
        StoreBackend::Firestore => {
            let firestore = FirestoreConfig::from_env()?;
            info!(project = %firestore.project_id, "Using Firestore content store");
            let store = FirestoreStore::new(
                firestore,
                &config.source_collection,
                &config.result_collection,
            )
            .await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            info!("Using in-memory content store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
