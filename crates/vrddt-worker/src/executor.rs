//! Worker loop.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vrddt_models::WorkItem;
use vrddt_queue::WorkQueueExt;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::processor::{ProcessOutcome, Processor};
use crate::services::Services;

/// Why [`Executor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Shutdown,
    MaxErrors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub reason: ExitReason,
    pub processed: u64,
    pub errors: u64,
}

/// Consecutive counted failures; a success resets it.
#[derive(Debug)]
struct ErrorBudget {
    consecutive: u32,
    max: u32,
}

impl ErrorBudget {
    fn new(max: u32) -> Self {
        Self { consecutive: 0, max: max.max(1) }
    }

    fn success(&mut self) {
        self.consecutive = 0;
    }

    /// Returns `true` once the budget is spent.
    fn failure(&mut self) -> bool {
        self.consecutive += 1;
        self.consecutive >= self.max
    }
}

/// Pulls one item at a time from the queue and runs it on its own task.
pub struct Executor {
    services: Services,
    processor: Arc<Processor>,
    config: WorkerConfig,
    shutdown: watch::Sender<bool>,
}

impl Executor {
    pub fn new(services: Services, processor: Processor, config: WorkerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            services,
            processor: Arc::new(processor),
            config,
            shutdown,
        }
    }

    /// Signal shutdown. The item in flight, if any, is allowed to finish.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Receive and process exactly one item.
    pub async fn process_next(&self) -> WorkerResult<ProcessOutcome> {
        let item = self.services.queue.receive_item().await?;
        self.run_item(item).await
    }

    /// Run until shutdown or until `max_errors` consecutive failures, then
    /// release every service connection.
    pub async fn run(&self) -> WorkerResult<RunSummary> {
        info!(
            max_errors = self.config.max_errors,
            sleep_ms = self.config.sleep.as_millis() as u64,
            "Starting worker loop"
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut budget = ErrorBudget::new(self.config.max_errors);
        let mut processed = 0u64;
        let mut errors = 0u64;

        let reason = loop {
            if *shutdown_rx.borrow() {
                break ExitReason::Shutdown;
            }

            let received = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => continue,
                item = self.services.queue.receive_item() => item,
            };

            let result = match received {
                Ok(item) => self.run_item(item).await,
                Err(e) => {
                    let e = WorkerError::from(e);
                    metrics::record_error(e.kind());
                    Err(e)
                }
            };

            match result {
                Ok(outcome) => {
                    processed += 1;
                    budget.success();
                    debug!(outcome = outcome.label(), "Item done");
                }
                Err(e) if e.is_soft() => {
                    warn!("Item skipped: {}", e);
                }
                Err(e) => {
                    errors += 1;
                    error!(kind = e.kind(), consecutive = budget.consecutive + 1, "Item failed: {}", e);
                    if budget.failure() {
                        error!(max_errors = budget.max, "Too many errors, stopping worker");
                        break ExitReason::MaxErrors;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.sleep) => {}
                _ = shutdown_rx.changed() => {}
            }
        };

        self.services.cleanup().await;
        info!(?reason, processed, errors, "Worker loop stopped");

        Ok(RunSummary {
            reason,
            processed,
            errors,
        })
    }

    async fn run_item(&self, item: WorkItem) -> WorkerResult<ProcessOutcome> {
        let started = Instant::now();
        let processor = Arc::clone(&self.processor);
        let task = tokio::spawn(async move { processor.process(item).await });

        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(WorkerError::TaskFailed(e.to_string())),
        };

        match &result {
            Ok(outcome) => metrics::record_outcome(outcome.label(), started.elapsed()),
            Err(e) => metrics::record_error(e.kind()),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, CANONICAL, SHORT};
    use std::time::Duration;
    use vrddt_models::ResultVideoRecord;
    use vrddt_queue::{QueueError, WorkQueue};

    const VIDEO: &str = "https://v.redd.it/a/DASH_720.mp4";

    async fn executor(h: &Harness, max_errors: u32) -> Arc<Executor> {
        h.services.init_consumer().await.unwrap();
        let processor = Processor::new(h.services.clone(), &h.work_dir);
        Arc::new(Executor::new(h.services.clone(), processor, h.config(max_errors)))
    }

    async fn wait_for_sources(h: &Harness, count: usize) {
        for _ in 0..500 {
            if h.store.source_count().await >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} source records", count);
    }

    #[test]
    fn test_error_budget() {
        let mut budget = ErrorBudget::new(3);
        assert!(!budget.failure());
        assert!(!budget.failure());
        budget.success();
        assert!(!budget.failure());
        assert!(!budget.failure());
        assert!(budget.failure());
    }

    #[tokio::test]
    async fn test_process_next_converts_item() {
        let h = Harness::new().await;
        let ex = executor(&h, 10).await;
        h.post(CANONICAL, VIDEO, b"video", Some(&b"audio"[..]));
        h.enqueue(SHORT).await;

        let outcome = ex.process_next().await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Created { .. }));
        assert!(h.producer.is_empty());
    }

    #[tokio::test]
    async fn test_double_enqueue_converts_once() {
        let h = Harness::new().await;
        let ex = executor(&h, 10).await;
        h.post(CANONICAL, VIDEO, b"video", Some(&b"audio"[..]));
        h.enqueue(SHORT).await;
        h.enqueue(SHORT).await;

        ex.process_next().await.unwrap();
        let second = ex.process_next().await.unwrap();

        assert!(matches!(second, ProcessOutcome::AlreadyProcessed { .. }));
        assert_eq!(h.transcoder.calls(), 1);
        assert_eq!(h.store.source_count().await, 1);
    }

    #[tokio::test]
    async fn test_result_item_rejected() {
        let h = Harness::new().await;
        let ex = executor(&h, 10).await;
        h.producer
            .publish_item(&WorkItem::ResultVideo(ResultVideoRecord::new("h", "u")))
            .await
            .unwrap();

        let err = ex.process_next().await.unwrap_err();
        assert!(matches!(err, WorkerError::UnsupportedWorkItem { kind: "result_video", .. }));
    }

    #[tokio::test]
    async fn test_undecodable_message() {
        let h = Harness::new().await;
        let ex = executor(&h, 10).await;
        h.producer.publish(b"not json").await.unwrap();

        let err = ex.process_next().await.unwrap_err();
        assert!(matches!(err, WorkerError::Queue(QueueError::Serialization(_))));
        assert_eq!(err.kind(), "decode");
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let h = Harness::new().await;
        let ex = executor(&h, 10).await;
        h.post(CANONICAL, VIDEO, b"video", Some(&b"audio"[..]));
        h.enqueue(CANONICAL).await;

        let runner = tokio::spawn({
            let ex = ex.clone();
            async move { ex.run().await }
        });
        wait_for_sources(&h, 1).await;
        ex.shutdown();

        let summary = runner.await.unwrap().unwrap();
        assert_eq!(summary.reason, ExitReason::Shutdown);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.errors, 0);
        assert!(h.store.is_closed());
    }

    #[tokio::test]
    async fn test_soft_errors_not_counted() {
        let h = Harness::new().await;
        let ex = executor(&h, 1).await;
        // No metadata registered for this post: MissingTitle.
        h.enqueue("https://www.reddit.com/r/videos/comments/2/untitled/").await;
        h.post(CANONICAL, VIDEO, b"video", Some(&b"audio"[..]));
        h.enqueue(CANONICAL).await;

        let runner = tokio::spawn({
            let ex = ex.clone();
            async move { ex.run().await }
        });
        wait_for_sources(&h, 1).await;
        ex.shutdown();

        let summary = runner.await.unwrap().unwrap();
        assert_eq!(summary.reason, ExitReason::Shutdown);
        assert_eq!(summary.errors, 0);
    }

    #[tokio::test]
    async fn test_malformed_metadata_does_not_spend_budget() {
        let h = Harness::new().await;
        let ex = executor(&h, 1).await;
        let broken = "https://www.reddit.com/r/videos/comments/3/broken/";
        h.malformed_post(broken);
        h.enqueue(broken).await;
        h.post(CANONICAL, VIDEO, b"video", Some(&b"audio"[..]));
        h.enqueue(CANONICAL).await;

        let runner = tokio::spawn({
            let ex = ex.clone();
            async move { ex.run().await }
        });
        wait_for_sources(&h, 1).await;
        ex.shutdown();

        let summary = runner.await.unwrap().unwrap();
        assert_eq!(summary.reason, ExitReason::Shutdown);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.processed, 1);
    }

    #[tokio::test]
    async fn test_store_outage_exhausts_budget_and_cleans_up() {
        let h = Harness::new().await;
        let ex = executor(&h, 2).await;
        h.post(CANONICAL, VIDEO, b"video", Some(&b"audio"[..]));
        h.store.take_down();
        h.enqueue(CANONICAL).await;
        h.enqueue(SHORT).await;

        let summary = ex.run().await.unwrap();

        assert_eq!(summary.reason, ExitReason::MaxErrors);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.processed, 0);
        assert!(h.store.is_closed());
        assert!(matches!(h.consumer.teardown().await, Err(QueueError::AlreadyClosed)));
        assert_eq!(h.scratch_entries(), 0);
    }

    #[tokio::test]
    async fn test_store_blip_counts_once_and_loop_continues() {
        let h = Harness::new().await;
        let ex = executor(&h, 2).await;
        h.post(CANONICAL, VIDEO, b"video", Some(&b"audio"[..]));
        h.store.fail_next(1);
        h.enqueue(CANONICAL).await;
        h.enqueue(CANONICAL).await;

        let runner = tokio::spawn({
            let ex = ex.clone();
            async move { ex.run().await }
        });
        wait_for_sources(&h, 1).await;
        ex.shutdown();

        let summary = runner.await.unwrap().unwrap();
        assert_eq!(summary.reason, ExitReason::Shutdown);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(h.transcoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_loop_survives_single_failure() {
        let h = Harness::new().await;
        let ex = executor(&h, 3).await;
        h.post(CANONICAL, VIDEO, b"video", Some(&b"audio"[..]));
        h.transcoder.fail_next();
        h.enqueue(CANONICAL).await;
        h.enqueue(CANONICAL).await;

        let runner = tokio::spawn({
            let ex = ex.clone();
            async move { ex.run().await }
        });
        wait_for_sources(&h, 1).await;
        ex.shutdown();

        let summary = runner.await.unwrap().unwrap();
        assert_eq!(summary.reason, ExitReason::Shutdown);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(h.transcoder.calls(), 2);
    }
}
