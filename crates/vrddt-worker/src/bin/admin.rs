//! Operator commands: resolve a URL, process one post in-process, bulk-insert work.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use vrddt_coordinator::{CoordinatorConfig, RequestCoordinator};
use vrddt_media::RedditClient;
use vrddt_models::{SourceVideoRecord, WorkItem};
use vrddt_queue::{MemoryQueue, MemoryQueueConfig, QueueConfig, WorkQueue, WorkQueueExt};
use vrddt_storage::StorageConfig;
use vrddt_store::{MemoryStore, StoreConfig};
use vrddt_worker::services::ffmpeg_transcoder;
use vrddt_worker::{init_tracing, Processor, Services, WorkerConfig};

#[derive(Parser)]
#[command(name = "vrddt-admin", about = "vrddt operator commands")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a post to its finished video through the configured queue and store
    Resolve {
        #[arg(long)]
        url: String,
        /// Store poll interval in milliseconds
        #[arg(long)]
        poll_ms: Option<u64>,
        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Convert one post in this process with an in-memory queue and store
    Process {
        #[arg(long)]
        url: String,
    },
    /// Publish every source record in a JSON array file, without checking the store
    InsertJson {
        #[arg(long)]
        file: PathBuf,
    },
    /// Resolve a post through a running HTTP API
    ResolveApi {
        #[arg(long, env = "VRDDT_API_URL")]
        api: String,
        #[arg(long)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Resolve {
            url,
            poll_ms,
            timeout_secs,
        } => resolve(&url, poll_ms, timeout_secs).await,
        Command::Process { url } => process(&url).await,
        Command::InsertJson { file } => insert_json(&file).await,
        Command::ResolveApi { api, url } => resolve_api(&api, &url).await,
    }
}

async fn resolve(url: &str, poll_ms: Option<u64>, timeout_secs: Option<u64>) -> anyhow::Result<()> {
    let store = vrddt_store::connect(&StoreConfig::from_env()).await?;
    store.init().await?;
    let queue = vrddt_queue::connect(&QueueConfig::from_env());
    queue.init().await?;

    let config = CoordinatorConfig::from_env().with_overrides(poll_ms, timeout_secs);
    let coordinator = RequestCoordinator::new(
        store.clone(),
        queue.clone(),
        Arc::new(RedditClient::from_env()?),
        config,
    );

    let result = coordinator.resolve(url).await;
    if let Err(e) = queue.teardown().await {
        warn!("Queue teardown failed: {}", e);
    }
    if let Err(e) = store.cleanup().await {
        warn!("Store cleanup failed: {}", e);
    }

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn process(url: &str) -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    let storage = vrddt_storage::connect(&StorageConfig::from_env()).await?;
    storage.init().await?;

    let producer = MemoryQueue::new(MemoryQueueConfig::default());
    producer.become_producer().await?;
    let consumer = Arc::new(producer.new_connection());
    consumer.become_consumer().await?;

    let store = Arc::new(MemoryStore::new());
    let services = Services {
        queue: consumer.clone(),
        store: store.clone(),
        storage,
        transcoder: Arc::new(ffmpeg_transcoder(&config)?),
        fetcher: Arc::new(RedditClient::from_env()?),
    };

    producer
        .publish_item(&WorkItem::from(SourceVideoRecord::shell(url)))
        .await?;
    let item = consumer.receive_item().await?;

    let processor = Processor::new(services.clone(), &config.work_dir);
    let outcome = processor.process(item).await;
    services.cleanup().await;

    println!("{}", serde_json::to_string_pretty(&outcome?)?);
    Ok(())
}

async fn insert_json(file: &Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let records: Vec<SourceVideoRecord> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;

    let queue = vrddt_queue::connect(&QueueConfig::from_env());
    queue.init().await?;
    queue.become_producer().await?;

    for record in records {
        let id = record.id.clone();
        queue.publish_item(&WorkItem::from(record)).await?;
        info!(record_id = %id, "Published source record");
    }

    queue.teardown().await?;
    Ok(())
}

async fn resolve_api(api: &str, url: &str) -> anyhow::Result<()> {
    let endpoint = format!("{}/vrddt_videos/", api.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .get(&endpoint)
        .query(&[("url", url)])
        .send()
        .await
        .with_context(|| format!("calling {}", endpoint))?;

    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        anyhow::bail!("API returned {}", status);
    }
    Ok(())
}
