//! Application state.

use std::sync::Arc;

use vrddt_coordinator::{CoordinatorConfig, RequestCoordinator};
use vrddt_media::{RedditClient, UrlResolver};
use vrddt_queue::{QueueConfig, WorkQueue};
use vrddt_store::{ContentStore, StoreConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn ContentStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub coordinator: RequestCoordinator,
}

impl AppState {
    /// Connect store and queue from the environment and take the producer role.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let store = vrddt_store::connect(&StoreConfig::from_env()).await?;
        store.init().await?;

        let queue = vrddt_queue::connect(&QueueConfig::from_env());
        queue.init().await?;
        queue.become_producer().await?;

        let resolver = Arc::new(RedditClient::from_env()?);
        Ok(Self::from_parts(config, store, queue, resolver, CoordinatorConfig::from_env()))
    }

    pub fn from_parts(
        config: ApiConfig,
        store: Arc<dyn ContentStore>,
        queue: Arc<dyn WorkQueue>,
        resolver: Arc<dyn UrlResolver>,
        coordinator: CoordinatorConfig,
    ) -> Self {
        let coordinator = RequestCoordinator::new(store.clone(), queue.clone(), resolver, coordinator);
        Self {
            config,
            store,
            queue,
            coordinator,
        }
    }

    /// Release queue and store connections.
    pub async fn shutdown(&self) {
        if let Err(e) = self.queue.teardown().await {
            tracing::warn!("Queue teardown failed: {}", e);
        }
        if let Err(e) = self.store.cleanup().await {
            tracing::warn!("Store cleanup failed: {}", e);
        }
    }
}
