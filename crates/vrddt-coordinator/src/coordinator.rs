//! The enqueue-if-absent, then poll protocol.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use vrddt_media::UrlResolver;
use vrddt_models::{ResultVideoRecord, SourceVideoRecord, WorkItem};
use vrddt_queue::{WorkQueue, WorkQueueExt};
use vrddt_store::{ContentStore, ContentStoreExt};

use crate::error::{CoordinatorError, CoordinatorResult};

const MIN_POLL: Duration = Duration::from_millis(10);
const MAX_POLL: Duration = Duration::from_millis(5000);
const MIN_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_TIMEOUT: Duration = Duration::from_secs(600);

pub fn clamp_poll_interval(poll: Duration) -> Duration {
    poll.clamp(MIN_POLL, MAX_POLL)
}

pub fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT)
}

/// Polling cadence and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(60),
        }
    }
}

impl CoordinatorConfig {
    /// Build a config, clamping both values into their allowed ranges.
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval: clamp_poll_interval(poll_interval),
            timeout: clamp_timeout(timeout),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self::new(
            std::env::var("COORDINATOR_POLL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            std::env::var("COORDINATOR_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        )
    }

    /// Override with caller-supplied values, re-clamping.
    pub fn with_overrides(self, poll_ms: Option<u64>, timeout_secs: Option<u64>) -> Self {
        Self::new(
            poll_ms.map(Duration::from_millis).unwrap_or(self.poll_interval),
            timeout_secs.map(Duration::from_secs).unwrap_or(self.timeout),
        )
    }
}

/// Result of an enqueue-only request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub canonical_url: String,
    /// False when a source record already existed and nothing was published.
    pub published: bool,
}

/// What the store currently says about a canonical URL.
enum Lookup {
    Ready(ResultVideoRecord),
    InFlight,
    Absent,
}

/// Resolves source URLs to finished videos on behalf of the API and the CLI.
#[derive(Clone)]
pub struct RequestCoordinator {
    store: Arc<dyn ContentStore>,
    queue: Arc<dyn WorkQueue>,
    resolver: Arc<dyn UrlResolver>,
    config: CoordinatorConfig,
}

impl RequestCoordinator {
    pub fn new(
        store: Arc<dyn ContentStore>,
        queue: Arc<dyn WorkQueue>,
        resolver: Arc<dyn UrlResolver>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            queue,
            resolver,
            config: CoordinatorConfig::new(config.poll_interval, config.timeout),
        }
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    /// Canonicalize `url` with the configured resolver.
    pub async fn canonicalize(&self, url: &str) -> CoordinatorResult<String> {
        let url = url.trim();
        if url.is_empty() {
            return Err(CoordinatorError::InvalidUrl("empty URL".to_string()));
        }
        Ok(self.resolver.canonicalize(url).await?)
    }

    /// Resolve with the configured poll interval and timeout.
    pub async fn resolve(&self, url: &str) -> CoordinatorResult<ResultVideoRecord> {
        self.resolve_with(url, self.config).await
    }

    /// Resolve a source URL to its finished video, enqueueing work if needed.
    pub async fn resolve_with(
        &self,
        url: &str,
        config: CoordinatorConfig,
    ) -> CoordinatorResult<ResultVideoRecord> {
        let config = CoordinatorConfig::new(config.poll_interval, config.timeout);
        let canonical = self.canonicalize(url).await?;
        let span = info_span!("resolve", url = %canonical);

        async {
            match self.lookup(&canonical).await? {
                Lookup::Ready(result) => {
                    counter!("vrddt_coordinator_requests_total", "outcome" => "hit").increment(1);
                    debug!(result_id = %result.id, "Already materialized");
                    return Ok(result);
                }
                Lookup::InFlight => {
                    info!("Source record present without result, waiting");
                }
                Lookup::Absent => {
                    self.publish_shell(&canonical).await?;
                }
            }

            let result = self.poll(&canonical, config).await;
            let outcome = match &result {
                Ok(_) => "materialized",
                Err(e) if e.is_timeout() => "timeout",
                Err(_) => "error",
            };
            counter!("vrddt_coordinator_requests_total", "outcome" => outcome).increment(1);
            result
        }
        .instrument(span)
        .await
    }

    /// Publish a shell record for `url` unless the store already knows it.
    pub async fn enqueue(&self, url: &str) -> CoordinatorResult<EnqueueOutcome> {
        let canonical = self.canonicalize(url).await?;
        let published = match self.store.source_by_url(&canonical).await? {
            Some(_) => false,
            None => {
                self.publish_shell(&canonical).await?;
                true
            }
        };
        Ok(EnqueueOutcome {
            canonical_url: canonical,
            published,
        })
    }

    async fn publish_shell(&self, canonical: &str) -> CoordinatorResult<()> {
        self.queue.become_producer().await?;
        let item = WorkItem::from(SourceVideoRecord::shell(canonical));
        self.queue.publish_item(&item).await?;
        info!(url = %canonical, "Enqueued source video");
        Ok(())
    }

    async fn lookup(&self, canonical: &str) -> CoordinatorResult<Lookup> {
        let Some(source) = self.store.source_by_url(canonical).await? else {
            return Ok(Lookup::Absent);
        };
        match self.store.resolve_result(&source).await? {
            Some(result) => Ok(Lookup::Ready(result)),
            None => Ok(Lookup::InFlight),
        }
    }

    /// Sleep-then-check until the record resolves. Fires `Timeout` at the
    /// first check at or past the budget, so never before `timeout` and
    /// never later than `timeout + poll_interval`.
    async fn poll(&self, canonical: &str, config: CoordinatorConfig) -> CoordinatorResult<ResultVideoRecord> {
        let started = Instant::now();
        loop {
            tokio::time::sleep(config.poll_interval).await;

            if let Lookup::Ready(result) = self.lookup(canonical).await? {
                info!(
                    result_id = %result.id,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Video materialized"
                );
                return Ok(result);
            }

            if started.elapsed() >= config.timeout {
                warn!(budget_secs = config.timeout.as_secs(), "Gave up waiting for video");
                return Err(CoordinatorError::Timeout {
                    budget: config.timeout,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vrddt_media::MediaResult;
    use vrddt_models::RecordId;
    use vrddt_queue::{MemoryQueue, MemoryQueueConfig};
    use vrddt_store::MemoryStore;

    /// Treats every input as already canonical.
    struct Identity;

    #[async_trait]
    impl UrlResolver for Identity {
        async fn canonicalize(&self, url: &str) -> MediaResult<String> {
            Ok(url.to_string())
        }
    }

    const URL: &str = "https://www.reddit.com/r/videos/comments/1/x";

    struct Fixture {
        store: Arc<MemoryStore>,
        queue: Arc<MemoryQueue>,
        coordinator: RequestCoordinator,
    }

    fn fixture(poll_ms: u64, timeout_secs: u64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new(MemoryQueueConfig::default()));
        let coordinator = RequestCoordinator::new(
            store.clone(),
            queue.clone(),
            Arc::new(Identity),
            CoordinatorConfig::new(Duration::from_millis(poll_ms), Duration::from_secs(timeout_secs)),
        );
        Fixture {
            store,
            queue,
            coordinator,
        }
    }

    async fn materialize(store: &MemoryStore, url: &str) -> ResultVideoRecord {
        let result = ResultVideoRecord::new("hash", "https://cdn.example.com/x.mp4");
        store.create_result_video(&result).await.unwrap();
        store
            .create_source_video(&SourceVideoRecord::shell(url).with_result(result.id.clone()))
            .await
            .unwrap();
        result
    }

    #[test]
    fn test_clamping() {
        assert_eq!(clamp_poll_interval(Duration::from_millis(1)), Duration::from_millis(10));
        assert_eq!(clamp_poll_interval(Duration::from_secs(60)), Duration::from_millis(5000));
        assert_eq!(clamp_poll_interval(Duration::from_millis(500)), Duration::from_millis(500));
        assert_eq!(clamp_timeout(Duration::ZERO), Duration::from_secs(1));
        assert_eq!(clamp_timeout(Duration::from_secs(3600)), Duration::from_secs(600));
        assert_eq!(clamp_timeout(Duration::from_secs(60)), Duration::from_secs(60));
    }

    #[test]
    fn test_overrides_are_clamped() {
        let config = CoordinatorConfig::default().with_overrides(Some(0), Some(10_000));
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert_eq!(config.timeout, Duration::from_secs(600));

        let config = CoordinatorConfig::default().with_overrides(None, None);
        assert_eq!(config, CoordinatorConfig::default());
    }

    #[tokio::test]
    async fn test_fast_path_skips_queue() {
        let f = fixture(10, 1);
        let expected = materialize(&f.store, URL).await;

        let result = f.coordinator.resolve(URL).await.unwrap();
        assert_eq!(result, expected);
        assert!(f.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_within_one_poll_of_budget() {
        let f = fixture(300, 1);
        let started = Instant::now();

        let err = f.coordinator.resolve(URL).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, CoordinatorError::Timeout { budget } if budget == Duration::from_secs(1)));
        assert!(elapsed >= Duration::from_secs(1), "fired early: {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(1300), "fired late: {:?}", elapsed);

        // The shell record was published exactly once.
        assert_eq!(f.queue.len(), 1);
        let consumer = f.queue.new_connection();
        consumer.become_consumer().await.unwrap();
        let item = WorkItem::from_bytes(&consumer.try_receive().unwrap()).unwrap();
        assert_eq!(item.kind(), "source_video");
        assert_eq!(item.record_id().len(), 32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_worker_finishes() {
        let f = fixture(100, 5);
        let store = f.store.clone();
        let worker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(750)).await;
            materialize(&store, URL).await
        });

        let result = f.coordinator.resolve(URL).await.unwrap();
        assert_eq!(result, worker.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_shell_is_not_republished() {
        let f = fixture(100, 1);
        f.store
            .create_source_video(&SourceVideoRecord::shell(URL))
            .await
            .unwrap();

        let err = f.coordinator.resolve(URL).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn test_broken_reference_is_consistency_error() {
        let f = fixture(10, 1);
        f.store
            .create_source_video(
                &SourceVideoRecord::shell(URL).with_result(RecordId::from("missing")),
            )
            .await
            .unwrap();

        let err = f.coordinator.resolve(URL).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Consistency(_)));
    }

    #[tokio::test]
    async fn test_enqueue_only_publishes_unknown_urls() {
        let f = fixture(10, 1);
        let outcome = f.coordinator.enqueue(URL).await.unwrap();
        assert!(outcome.published);
        assert_eq!(outcome.canonical_url, URL);

        materialize(&f.store, "https://www.reddit.com/r/other").await;
        let outcome = f.coordinator.enqueue("https://www.reddit.com/r/other").await.unwrap();
        assert!(!outcome.published);
        assert_eq!(f.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_url_is_invalid() {
        let f = fixture(10, 1);
        assert!(matches!(
            f.coordinator.resolve("   ").await,
            Err(CoordinatorError::InvalidUrl(_))
        ));
    }
}
