//! Conversion worker.
//!
//! This crate provides:
//! - The per-item processor with URL, stream and content deduplication
//! - The worker loop with a consecutive-error budget and graceful shutdown
//! - Service wiring from environment configuration
//! - Structured logging and metrics for processed items

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod services;

#[cfg(test)]
mod testing;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{Executor, ExitReason, RunSummary};
pub use logging::{init_tracing, ItemLogger};
pub use processor::{ProcessOutcome, Processor};
pub use services::Services;
