//! Worker error types.

use thiserror::Error;
use vrddt_media::MediaError;
use vrddt_queue::QueueError;
use vrddt_storage::StorageError;
use vrddt_store::StoreError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("No work can be performed for {kind} item {id}")]
    UnsupportedWorkItem { kind: &'static str, id: String },

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Item task failed: {0}")]
    TaskFailed(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for WorkerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::BrokenReference { .. } => Self::Consistency(e.to_string()),
            other => Self::Store(other),
        }
    }
}

impl WorkerError {
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// A property of the post rather than a failure; not counted.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Media(e) if e.is_soft())
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedWorkItem { .. } => "unsupported",
            Self::Consistency(_) => "consistency",
            Self::ConfigError(_) => "config",
            Self::TaskFailed(_) => "task",
            Self::Store(_) => "store",
            Self::Storage(_) => "storage",
            Self::Media(_) => "media",
            Self::Queue(QueueError::Serialization(_)) | Self::Queue(QueueError::Json(_)) => "decode",
            Self::Queue(_) => "queue",
            Self::Io(_) => "io",
        }
    }
}
