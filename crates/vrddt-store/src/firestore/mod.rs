//! Firestore REST backend.

mod client;
mod store;
mod token;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use store::FirestoreStore;
