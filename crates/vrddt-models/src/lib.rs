//! Shared data models for the vrddt conversion pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Source video records (one per canonical Reddit URL)
//! - Result video records (one per distinct finished MP4)
//! - The tagged work item carried on the queue
//! - URL helpers for canonical formatting and DASH audio derivation

pub mod record;
pub mod utils;
pub mod work;

// Re-export common types
pub use record::{fields, RecordId, ResultVideoRecord, SourceVideoRecord, ValidationError};
pub use utils::{derive_audio_url, format_canonical_url, metadata_url};
pub use work::WorkItem;
