//! Queue message schema.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::record::{ResultVideoRecord, SourceVideoRecord};

/// A unit of work carried on the queue, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkItem {
    /// Convert a Reddit post (usually an empty shell with only `url` set)
    SourceVideo(SourceVideoRecord),
    /// Finished videos need no work; accepted on the wire so the worker can reject them explicitly
    ResultVideo(ResultVideoRecord),
}

impl WorkItem {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkItem::SourceVideo(_) => "source_video",
            WorkItem::ResultVideo(_) => "result_video",
        }
    }

    /// Id of the wrapped record, for log context.
    pub fn record_id(&self) -> &str {
        match self {
            WorkItem::SourceVideo(r) => r.id.as_str(),
            WorkItem::ResultVideo(r) => r.id.as_str(),
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl From<SourceVideoRecord> for WorkItem {
    fn from(record: SourceVideoRecord) -> Self {
        WorkItem::SourceVideo(record)
    }
}
