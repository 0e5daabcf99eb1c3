//! Work queue contract and backend selection.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use vrddt_models::WorkItem;

use crate::error::{QueueError, QueueResult};
use crate::memory::{MemoryQueue, MemoryQueueConfig};
use crate::rabbitmq::{RabbitMqConfig, RabbitMqQueue};

/// Role a queue connection operates in. Chosen once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unassigned,
    Producer,
    Consumer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unassigned => "unassigned",
            Role::Producer => "producer",
            Role::Consumer => "consumer",
        }
    }

    /// Transition to `target`. Re-assigning the same role is a no-op.
    pub(crate) fn assign(&mut self, target: Role) -> QueueResult<bool> {
        match *self {
            Role::Unassigned => {
                *self = target;
                Ok(true)
            }
            current if current == target => Ok(false),
            current => Err(QueueError::RoleMismatch {
                expected: target,
                actual: current,
            }),
        }
    }

    pub(crate) fn require(&self, expected: Role) -> QueueResult<()> {
        if *self == expected {
            Ok(())
        } else {
            Err(QueueError::RoleMismatch {
                expected,
                actual: *self,
            })
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable, competing-consumers work channel.
///
/// A connection becomes either a producer or a consumer; calling the other
/// role's operation fails with [`QueueError::RoleMismatch`].
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Declare the durable topology. Safe to call repeatedly.
    async fn init(&self) -> QueueResult<()>;

    /// Assign the producer role (idempotent).
    async fn become_producer(&self) -> QueueResult<()>;

    /// Assign the consumer role with prefetch 1 and a unique consumer tag (idempotent).
    async fn become_consumer(&self) -> QueueResult<()>;

    /// Publish one message.
    async fn publish(&self, payload: &[u8]) -> QueueResult<()>;

    /// Block until a message arrives, acknowledge it and hand it over.
    async fn receive(&self) -> QueueResult<Vec<u8>>;

    /// Release the connection. A second call fails with [`QueueError::AlreadyClosed`].
    async fn teardown(&self) -> QueueResult<()>;
}

/// Typed helpers over the byte-level contract.
#[async_trait]
pub trait WorkQueueExt: WorkQueue {
    async fn publish_item(&self, item: &WorkItem) -> QueueResult<()> {
        let payload = item
            .to_bytes()
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        self.publish(&payload).await
    }

    async fn receive_item(&self) -> QueueResult<WorkItem> {
        let payload = self.receive().await?;
        WorkItem::from_bytes(&payload).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}

impl<T: WorkQueue + ?Sized> WorkQueueExt for T {}

/// Which queue implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    #[default]
    RabbitMq,
    Memory,
}

impl QueueBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rabbitmq" | "amqp" => Some(Self::RabbitMq),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub rabbitmq: RabbitMqConfig,
    pub memory: MemoryQueueConfig,
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            backend: std::env::var("QUEUE_BACKEND")
                .ok()
                .and_then(|s| QueueBackend::parse(&s))
                .unwrap_or_default(),
            rabbitmq: RabbitMqConfig::from_env(),
            memory: MemoryQueueConfig::from_env(),
        }
    }
}

/// Build the configured queue. Nothing is declared until [`WorkQueue::init`].
pub fn connect(config: &QueueConfig) -> Arc<dyn WorkQueue> {
    match config.backend {
        QueueBackend::RabbitMq => {
            info!(
                queue = %config.rabbitmq.queue_name,
                exchange = %config.rabbitmq.exchange_name,
                "Using RabbitMQ work queue"
            );
            Arc::new(RabbitMqQueue::new(config.rabbitmq.clone()))
        }
        QueueBackend::Memory => {
            info!(max_size = config.memory.max_size, "Using in-memory work queue");
            Arc::new(MemoryQueue::new(config.memory.clone()))
        }
    }
}
