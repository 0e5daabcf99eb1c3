//! Durable work queue for the conversion pipeline.
//!
//! This crate provides:
//! - The role-based [`WorkQueue`] contract (producer / consumer)
//! - A RabbitMQ implementation with durable exchange, queue and binding
//! - A bounded in-memory implementation for local runs and tests
//! - Typed helpers for publishing and receiving [`WorkItem`]s

pub mod error;
pub mod memory;
pub mod queue;
pub mod rabbitmq;

pub use error::{QueueError, QueueResult};
pub use memory::{MemoryQueue, MemoryQueueConfig};
pub use queue::{connect, QueueBackend, QueueConfig, Role, WorkQueue, WorkQueueExt};
pub use rabbitmq::{RabbitMqConfig, RabbitMqQueue};

pub use vrddt_models::WorkItem;
