//! Request coordination for client-facing surfaces.
//!
//! A resolve request canonicalizes the URL, answers from the content store
//! when the video is already materialized, and otherwise publishes a shell
//! record to the work queue and polls the store until the worker finishes or
//! the timeout expires.

pub mod coordinator;
pub mod error;

pub use coordinator::{
    clamp_poll_interval, clamp_timeout, CoordinatorConfig, EnqueueOutcome, RequestCoordinator,
};
pub use error::{CoordinatorError, CoordinatorResult};
