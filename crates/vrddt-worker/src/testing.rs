//! In-process fakes wired into a [`Services`] for processor and loop tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use vrddt_media::{MediaError, MediaResult, SourceFetcher, Transcoder, UrlResolver, VideoMetadata};
use vrddt_models::{derive_audio_url, ResultVideoRecord, SourceVideoRecord, WorkItem};
use vrddt_queue::{MemoryQueue, MemoryQueueConfig, WorkQueue, WorkQueueExt};
use vrddt_storage::{LocalStorage, ObjectStorage};
use vrddt_store::{ContentStore, MemoryStore, Selector, StoreError, StoreResult};

use crate::config::WorkerConfig;
use crate::processor::Processor;
use crate::services::Services;

pub const CANONICAL: &str = "https://www.reddit.com/r/videos/comments/1/x/";
pub const SHORT: &str = "https://redd.it/1";

// ============================================================================
// Fetcher
// ============================================================================

#[derive(Default)]
pub struct FakeFetcher {
    aliases: Mutex<HashMap<String, String>>,
    posts: Mutex<HashMap<String, VideoMetadata>>,
    bytes: Mutex<HashMap<String, Vec<u8>>>,
    malformed: Mutex<HashSet<String>>,
    downloads: AtomicUsize,
}

impl FakeFetcher {
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UrlResolver for FakeFetcher {
    async fn canonicalize(&self, url: &str) -> MediaResult<String> {
        let alias = self.aliases.lock().unwrap().get(url).cloned();
        Ok(alias.unwrap_or_else(|| url.to_string()))
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch_metadata(&self, canonical: &str) -> MediaResult<VideoMetadata> {
        if self.malformed.lock().unwrap().contains(canonical) {
            return Err(MediaError::InvalidMetadata(format!("{}: no post in listing", canonical)));
        }
        self.posts
            .lock()
            .unwrap()
            .get(canonical)
            .cloned()
            .ok_or_else(|| MediaError::MissingTitle(canonical.to_string()))
    }

    async fn download(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let body = self.bytes.lock().unwrap().get(url).cloned();
        match body {
            Some(body) => {
                tokio::fs::write(dest, &body).await?;
                Ok(body.len() as u64)
            }
            None => Err(MediaError::HttpStatus {
                url: url.to_string(),
                status: 403,
            }),
        }
    }
}

// ============================================================================
// Transcoder
// ============================================================================

/// Writes the video bytes followed by the audio bytes.
#[derive(Default)]
pub struct FakeTranscoder {
    calls: AtomicUsize,
    last_had_audio: AtomicBool,
    fail_next: AtomicBool,
}

impl FakeTranscoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_had_audio(&self) -> bool {
        self.last_had_audio.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn convert(&self, video: &Path, audio: Option<&Path>, output: &Path) -> MediaResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_had_audio.store(audio.is_some(), Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(MediaError::ffmpeg_failed("fake failure", None, Some(1)));
        }

        let mut merged = tokio::fs::read(video).await?;
        if let Some(audio) = audio {
            merged.extend(tokio::fs::read(audio).await?);
        }
        tokio::fs::write(output, merged).await?;
        Ok(())
    }
}

// ============================================================================
// Store
// ============================================================================

/// [`MemoryStore`] with switchable failures.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
    failures_left: AtomicUsize,
    fail_source_creates: AtomicBool,
    rival_result: AtomicBool,
    rival_source: AtomicBool,
}

impl FlakyStore {
    /// Every operation fails with [`StoreError::Unavailable`] until [`FlakyStore::restore`].
    pub fn take_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    /// Fail only the next `n` operations.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn restore(&self) {
        self.down.store(false, Ordering::SeqCst);
    }

    pub fn fail_source_creates(&self) {
        self.fail_source_creates.store(true, Ordering::SeqCst);
    }

    /// Before the next result create, store a competing result with the same md5.
    pub fn rival_next_result(&self) {
        self.rival_result.store(true, Ordering::SeqCst);
    }

    /// Before the next source create, store a competing source with the same URL.
    pub fn rival_next_source(&self) {
        self.rival_source.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub async fn source_count(&self) -> usize {
        self.inner.source_count().await
    }

    pub async fn result_count(&self) -> usize {
        self.inner.result_count().await
    }

    fn check(&self) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("store is down"));
        }
        let transient = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(StoreError::unavailable("store blipped"));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn init(&self) -> StoreResult<()> {
        self.check()?;
        self.inner.init().await
    }

    async fn cleanup(&self) -> StoreResult<()> {
        self.inner.cleanup().await
    }

    async fn create_source_video(&self, record: &SourceVideoRecord) -> StoreResult<()> {
        self.check()?;
        if self.fail_source_creates.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("source write rejected"));
        }
        if self.rival_source.swap(false, Ordering::SeqCst) {
            self.inner.create_source_video(&record.clone().fresh()).await?;
        }
        self.inner.create_source_video(record).await
    }

    async fn find_source_video(&self, selector: &Selector) -> StoreResult<SourceVideoRecord> {
        self.check()?;
        self.inner.find_source_video(selector).await
    }

    async fn find_source_videos(
        &self,
        selector: &Selector,
        limit: usize,
    ) -> StoreResult<Vec<SourceVideoRecord>> {
        self.check()?;
        self.inner.find_source_videos(selector, limit).await
    }

    async fn delete_source_videos(&self, selector: &Selector) -> StoreResult<u64> {
        self.check()?;
        self.inner.delete_source_videos(selector).await
    }

    async fn create_result_video(&self, record: &ResultVideoRecord) -> StoreResult<()> {
        self.check()?;
        if self.rival_result.swap(false, Ordering::SeqCst) {
            let rival = ResultVideoRecord::new(record.content_hash.clone(), "https://cdn.example.com/rival.mp4");
            self.inner.create_result_video(&rival).await?;
        }
        self.inner.create_result_video(record).await
    }

    async fn find_result_video(&self, selector: &Selector) -> StoreResult<ResultVideoRecord> {
        self.check()?;
        self.inner.find_result_video(selector).await
    }

    async fn find_result_videos(
        &self,
        selector: &Selector,
        limit: usize,
    ) -> StoreResult<Vec<ResultVideoRecord>> {
        self.check()?;
        self.inner.find_result_videos(selector, limit).await
    }

    async fn delete_result_videos(&self, selector: &Selector) -> StoreResult<u64> {
        self.check()?;
        self.inner.delete_result_videos(selector).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    _dir: TempDir,
    pub work_dir: PathBuf,
    pub producer: Arc<MemoryQueue>,
    pub consumer: Arc<MemoryQueue>,
    pub store: Arc<FlakyStore>,
    pub storage: Arc<LocalStorage>,
    pub transcoder: Arc<FakeTranscoder>,
    pub fetcher: Arc<FakeFetcher>,
    pub services: Services,
    pub processor: Processor,
}

impl Harness {
    pub async fn new() -> Self {
        let fake = Arc::new(FakeFetcher::default());
        Self::with_fetcher(fake.clone(), Some(fake)).await
    }

    /// Build with `fetcher` standing in for the source site; `fake` (when
    /// given) is where [`Harness::post`] registers posts.
    pub async fn with_fetcher(fetcher: Arc<dyn SourceFetcher>, fake: Option<Arc<FakeFetcher>>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("work");

        let producer = Arc::new(MemoryQueue::new(MemoryQueueConfig::default()));
        producer.become_producer().await.unwrap();
        let consumer = Arc::new(producer.new_connection());

        let store = Arc::new(FlakyStore::default());
        let storage = Arc::new(
            LocalStorage::new(dir.path().join("objects")).with_public_base_url("https://cdn.example.com"),
        );
        let transcoder = Arc::new(FakeTranscoder::default());
        let fake = fake.unwrap_or_default();

        let services = Services {
            queue: consumer.clone(),
            store: store.clone(),
            storage: storage.clone(),
            transcoder: transcoder.clone(),
            fetcher,
        };
        let processor = Processor::new(services.clone(), &work_dir);

        Self {
            _dir: dir,
            work_dir,
            producer,
            consumer,
            store,
            storage,
            transcoder,
            fetcher: fake,
            services,
            processor,
        }
    }

    /// Register a post at `canonical` (reachable from [`SHORT`] too when it
    /// is [`CANONICAL`]). Audio bytes are served only when given.
    pub fn post(&self, canonical: &str, video_url: &str, video: &[u8], audio: Option<&[u8]>) {
        let audio_url = derive_audio_url(video_url).unwrap_or_default();
        if canonical == CANONICAL {
            self.fetcher
                .aliases
                .lock()
                .unwrap()
                .insert(SHORT.to_string(), CANONICAL.to_string());
        }
        self.fetcher.posts.lock().unwrap().insert(
            canonical.to_string(),
            VideoMetadata {
                title: "Post".to_string(),
                video_url: video_url.to_string(),
                audio_url: audio_url.clone(),
            },
        );

        let mut bytes = self.fetcher.bytes.lock().unwrap();
        bytes.insert(video_url.to_string(), video.to_vec());
        if let Some(audio) = audio {
            bytes.insert(audio_url, audio.to_vec());
        }
    }

    /// Serve a listing at `canonical` that carries no post.
    pub fn malformed_post(&self, canonical: &str) {
        self.fetcher.malformed.lock().unwrap().insert(canonical.to_string());
    }

    pub fn item(&self, url: &str) -> WorkItem {
        WorkItem::from(SourceVideoRecord::shell(url))
    }

    pub async fn enqueue(&self, url: &str) {
        self.producer.publish_item(&self.item(url)).await.unwrap();
    }

    pub async fn objects(&self) -> Vec<String> {
        self.storage
            .list("")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect()
    }

    /// Entries left in the scratch parent directory.
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(&self.work_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    pub fn config(&self, max_errors: u32) -> WorkerConfig {
        WorkerConfig {
            max_errors,
            sleep: std::time::Duration::from_millis(1),
            work_dir: self.work_dir.clone(),
            ..WorkerConfig::default()
        }
    }
}
