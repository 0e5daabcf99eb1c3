//! Axum HTTP API server.
//!
//! This crate provides:
//! - Resolve and enqueue endpoints backed by the request coordinator
//! - Read-only lookups of source and result video records
//! - Liveness/readiness probes and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
