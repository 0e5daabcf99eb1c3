//! Content store for the conversion pipeline.
//!
//! This crate provides:
//! - The [`ContentStore`] contract with selector-based find/create/delete
//! - Uniqueness on source `url` and result `md5`, surfaced as [`StoreError::AlreadyExists`]
//! - Checked resolution of a source record's weak result reference
//! - An in-memory store and a Firestore REST store

pub mod error;
pub mod firestore;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod selector;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use firestore::{FirestoreClient, FirestoreConfig, FirestoreStore};
pub use memory::MemoryStore;
pub use selector::Selector;
pub use store::{connect, ContentStore, ContentStoreExt, StoreBackend, StoreConfig};
