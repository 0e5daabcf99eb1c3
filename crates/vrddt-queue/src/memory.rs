//! Bounded in-memory queue.
//!
//! Connections created with [`MemoryQueue::new_connection`] share one buffer,
//! so a producer and a consumer can live in the same process.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::queue::{Role, WorkQueue};

const DEFAULT_MAX_SIZE: usize = 100_000;

#[derive(Debug, Clone)]
pub struct MemoryQueueConfig {
    /// Maximum buffered messages before publish fails
    pub max_size: usize,
}

impl Default for MemoryQueueConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl MemoryQueueConfig {
    pub fn from_env() -> Self {
        Self {
            max_size: std::env::var("MEMORY_QUEUE_MAX_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_SIZE),
        }
    }
}

struct Shared {
    items: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    max_size: usize,
}

pub struct MemoryQueue {
    shared: Arc<Shared>,
    role: Mutex<Role>,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new(config: MemoryQueueConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                items: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                max_size: config.max_size,
            }),
            role: Mutex::new(Role::Unassigned),
            closed: AtomicBool::new(false),
        }
    }

    /// Open another connection (with its own role) on the same buffer.
    pub fn new_connection(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            role: Mutex::new(Role::Unassigned),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.shared.items.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-blocking receive; fails with [`QueueError::Empty`] when nothing is buffered.
    pub fn try_receive(&self) -> QueueResult<Vec<u8>> {
        self.ensure_open()?;
        self.current_role()?.require(Role::Consumer)?;
        self.pop()?.ok_or(QueueError::Empty)
    }

    fn ensure_open(&self) -> QueueResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::connection_failed("memory queue connection is closed"));
        }
        Ok(())
    }

    fn current_role(&self) -> QueueResult<Role> {
        self.role
            .lock()
            .map(|r| *r)
            .map_err(|_| QueueError::connection_failed("role lock poisoned"))
    }

    fn assign(&self, target: Role) -> QueueResult<()> {
        let mut role = self
            .role
            .lock()
            .map_err(|_| QueueError::connection_failed("role lock poisoned"))?;
        if role.assign(target)? {
            debug!(role = %target, "Memory queue role assigned");
        }
        Ok(())
    }

    fn pop(&self) -> QueueResult<Option<Vec<u8>>> {
        let mut items = self
            .shared
            .items
            .lock()
            .map_err(|_| QueueError::dequeue_failed("queue lock poisoned"))?;
        Ok(items.pop_front())
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn init(&self) -> QueueResult<()> {
        self.ensure_open()
    }

    async fn become_producer(&self) -> QueueResult<()> {
        self.ensure_open()?;
        self.assign(Role::Producer)
    }

    async fn become_consumer(&self) -> QueueResult<()> {
        self.ensure_open()?;
        self.assign(Role::Consumer)
    }

    async fn publish(&self, payload: &[u8]) -> QueueResult<()> {
        self.ensure_open()?;
        self.current_role()?.require(Role::Producer)?;

        {
            let mut items = self
                .shared
                .items
                .lock()
                .map_err(|_| QueueError::enqueue_failed("queue lock poisoned"))?;
            if items.len() >= self.shared.max_size {
                return Err(QueueError::QueueFull {
                    max_size: self.shared.max_size,
                });
            }
            items.push_back(payload.to_vec());
        }

        self.shared.notify.notify_one();
        Ok(())
    }

    async fn receive(&self) -> QueueResult<Vec<u8>> {
        self.ensure_open()?;
        self.current_role()?.require(Role::Consumer)?;

        loop {
            if let Some(payload) = self.pop()? {
                return Ok(payload);
            }
            // notify_one stores a permit when nobody is waiting, so a publish
            // between pop and here is not lost.
            self.shared.notify.notified().await;
            self.ensure_open()?;
        }
    }

    async fn teardown(&self) -> QueueResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(QueueError::AlreadyClosed);
        }
        debug!("Memory queue connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::WorkQueueExt;
    use std::time::Duration;
    use vrddt_models::{SourceVideoRecord, WorkItem};

    async fn pair(max_size: usize) -> (MemoryQueue, MemoryQueue) {
        let producer = MemoryQueue::new(MemoryQueueConfig { max_size });
        let consumer = producer.new_connection();
        producer.become_producer().await.unwrap();
        consumer.become_consumer().await.unwrap();
        (producer, consumer)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (producer, consumer) = pair(10).await;
        producer.publish(b"one").await.unwrap();
        producer.publish(b"two").await.unwrap();

        assert_eq!(consumer.receive().await.unwrap(), b"one");
        assert_eq!(consumer.receive().await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_full_queue_is_resource_limit() {
        let (producer, _consumer) = pair(2).await;
        producer.publish(b"a").await.unwrap();
        producer.publish(b"b").await.unwrap();

        let err = producer.publish(b"c").await.unwrap_err();
        assert!(err.is_resource_limit());
        assert_eq!(producer.len(), 2);
    }

    #[tokio::test]
    async fn test_try_receive_on_empty() {
        let (_producer, consumer) = pair(2).await;
        assert!(matches!(consumer.try_receive(), Err(QueueError::Empty)));
    }

    #[tokio::test]
    async fn test_receive_blocks_until_publish() {
        let (producer, consumer) = pair(10).await;

        let waiter = tokio::spawn(async move { consumer.receive().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        producer.publish(b"late").await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got, b"late");
    }

    #[tokio::test]
    async fn test_role_mismatch() {
        let (producer, consumer) = pair(10).await;

        assert!(matches!(
            producer.receive().await,
            Err(QueueError::RoleMismatch { expected: Role::Consumer, actual: Role::Producer })
        ));
        assert!(matches!(
            consumer.publish(b"x").await,
            Err(QueueError::RoleMismatch { .. })
        ));
        assert!(producer.become_consumer().await.is_err());
        // Same role again is fine.
        assert!(producer.become_producer().await.is_ok());
    }

    #[tokio::test]
    async fn test_unassigned_cannot_publish() {
        let queue = MemoryQueue::new(MemoryQueueConfig::default());
        assert!(matches!(
            queue.publish(b"x").await,
            Err(QueueError::RoleMismatch { actual: Role::Unassigned, .. })
        ));
    }

    #[tokio::test]
    async fn test_teardown_only_once() {
        let queue = MemoryQueue::new(MemoryQueueConfig::default());
        queue.init().await.unwrap();
        queue.init().await.unwrap();
        queue.teardown().await.unwrap();
        assert!(matches!(queue.teardown().await, Err(QueueError::AlreadyClosed)));
        assert!(queue.become_producer().await.is_err());
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let (producer, consumer) = pair(10).await;
        let item = WorkItem::from(SourceVideoRecord::shell("https://reddit.com/r/a"));
        producer.publish_item(&item).await.unwrap();

        assert_eq!(consumer.receive_item().await.unwrap(), item);
    }

    #[tokio::test]
    async fn test_undecodable_payload() {
        let (producer, consumer) = pair(10).await;
        producer.publish(b"{not json").await.unwrap();

        let err = consumer.receive_item().await.unwrap_err();
        assert!(err.is_serialization());
    }
}
