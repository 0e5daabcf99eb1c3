//! Queue error types.

use thiserror::Error;

use crate::queue::Role;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Declare failed: {0}")]
    DeclareFailed(String),

    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Dequeue failed: {0}")]
    DequeueFailed(String),

    #[error("Role mismatch: operation requires {expected}, connection is {actual}")]
    RoleMismatch { expected: Role, actual: Role },

    #[error("Queue is full (max size {max_size})")]
    QueueFull { max_size: usize },

    #[error("Queue is empty")]
    Empty,

    #[error("Connection already torn down")]
    AlreadyClosed,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn declare_failed(msg: impl Into<String>) -> Self {
        Self::DeclareFailed(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn dequeue_failed(msg: impl Into<String>) -> Self {
        Self::DequeueFailed(msg.into())
    }

    /// Resource-limit errors are handed back to the caller, never retried here.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }

    /// Payload could not be encoded or decoded.
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Json(_))
    }
}
