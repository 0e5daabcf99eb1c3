//! Coordinator error types.

use std::time::Duration;

use thiserror::Error;
use vrddt_media::MediaError;
use vrddt_queue::QueueError;
use vrddt_store::StoreError;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out after {budget:?} waiting for the video")]
    Timeout { budget: Duration },

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("URL resolution failed: {0}")]
    Resolve(MediaError),
}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::BrokenReference { .. } => Self::Consistency(e.to_string()),
            other => Self::Store(other),
        }
    }
}

impl From<MediaError> for CoordinatorError {
    fn from(e: MediaError) -> Self {
        match &e {
            MediaError::HttpStatus { status: 404, url } => Self::NotFound(url.clone()),
            _ if e.is_invalid_input() => Self::InvalidUrl(e.to_string()),
            _ => Self::Resolve(e),
        }
    }
}

impl CoordinatorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
