//! Object storage for finished videos.
//!
//! This crate provides:
//! - The [`ObjectStorage`] contract (upload/download/delete/location/list/attributes)
//! - An S3-compatible client that makes uploads publicly readable
//! - A local-directory store for development and tests

pub mod client;
pub mod error;
pub mod local;
pub mod storage;

pub use client::{S3Config, S3Storage};
pub use error::{StorageError, StorageResult};
pub use local::LocalStorage;
pub use storage::{connect, ObjectAttributes, ObjectInfo, ObjectStorage, StorageBackend, StorageConfig};
