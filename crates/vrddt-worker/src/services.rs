//! Collaborators shared by the processor and the worker loop.

use std::sync::Arc;

use tracing::{info, warn};
use vrddt_media::{FfmpegRunner, FfmpegTranscoder, RedditClient, SourceFetcher, Transcoder};
use vrddt_queue::{QueueConfig, WorkQueue};
use vrddt_storage::{ObjectStorage, StorageConfig};
use vrddt_store::{ContentStore, StoreConfig};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// Everything the pipeline talks to, built once and passed explicitly.
#[derive(Clone)]
pub struct Services {
    pub queue: Arc<dyn WorkQueue>,
    pub store: Arc<dyn ContentStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub transcoder: Arc<dyn Transcoder>,
    pub fetcher: Arc<dyn SourceFetcher>,
}

impl Services {
    /// Build from environment configuration.
    pub async fn from_env(config: &WorkerConfig) -> WorkerResult<Self> {
        let store = vrddt_store::connect(&StoreConfig::from_env()).await?;
        Self::with_store(config, store).await
    }

    /// Build with an explicit store; queue, storage and media come from the environment.
    pub async fn with_store(config: &WorkerConfig, store: Arc<dyn ContentStore>) -> WorkerResult<Self> {
        let queue = vrddt_queue::connect(&QueueConfig::from_env());
        let storage = vrddt_storage::connect(&StorageConfig::from_env()).await?;
        Ok(Self {
            queue,
            store,
            storage,
            transcoder: Arc::new(ffmpeg_transcoder(config)?),
            fetcher: Arc::new(RedditClient::from_env()?),
        })
    }

    /// Initialize queue (as consumer), store and storage.
    pub async fn init_consumer(&self) -> WorkerResult<()> {
        self.queue.init().await?;
        self.queue.become_consumer().await?;
        self.store.init().await?;
        self.storage.init().await?;
        info!("Worker services initialized");
        Ok(())
    }

    /// Release queue, storage and store. Failures are logged, not returned.
    pub async fn cleanup(&self) {
        if let Err(e) = self.queue.teardown().await {
            warn!("Queue teardown failed: {}", e);
        }
        if let Err(e) = self.storage.cleanup().await {
            warn!("Storage cleanup failed: {}", e);
        }
        if let Err(e) = self.store.cleanup().await {
            warn!("Store cleanup failed: {}", e);
        }
        info!("Worker services released");
    }
}

pub fn ffmpeg_transcoder(config: &WorkerConfig) -> WorkerResult<FfmpegTranscoder> {
    let mut runner = FfmpegRunner::locate(config.ffmpeg_path.as_deref())?;
    if let Some(timeout) = config.transcode_timeout {
        runner = runner.with_timeout(timeout.as_secs().max(1));
    }
    info!(ffmpeg = %runner.binary().display(), "Using FFmpeg");
    Ok(FfmpegTranscoder::new(runner))
}

