//! Persisted records: one per observed source URL, one per finished video.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Wire/storage field names, shared by selectors and store backends.
pub mod fields {
    pub const ID: &str = "id";
    pub const URL: &str = "url";
    pub const AUDIO_URL: &str = "audio_url";
    pub const VIDEO_URL: &str = "video_url";
    pub const TITLE: &str = "title";
    pub const RESULT_VIDEO_ID: &str = "vrddt_video_id";
    pub const CONTENT_HASH: &str = "md5";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

/// Opaque record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Generate a new random identifier (32 lowercase hex characters).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Record validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// One observed Reddit URL and the streams it resolved to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceVideoRecord {
    /// Unique record ID
    pub id: RecordId,

    /// Canonical (post-redirect) URL
    pub url: String,

    /// DASH audio stream, empty when the post has no separate audio
    #[serde(default)]
    pub audio_url: String,

    /// DASH video stream
    #[serde(default)]
    pub video_url: String,

    #[serde(default)]
    pub title: String,

    /// Weak reference to the result record; lookup only
    #[serde(rename = "vrddt_video_id", default, skip_serializing_if = "Option::is_none")]
    pub result_video_id: Option<RecordId>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl SourceVideoRecord {
    /// Build an empty shell carrying only the URL, as pushed to the queue.
    pub fn shell(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::generate(),
            url: url.into(),
            audio_url: String::new(),
            video_url: String::new(),
            title: String::new(),
            result_video_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set the resolved streams.
    pub fn with_streams(mut self, audio_url: impl Into<String>, video_url: impl Into<String>) -> Self {
        self.audio_url = audio_url.into();
        self.video_url = video_url.into();
        self
    }

    /// Builder: set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builder: point at a result record.
    pub fn with_result(mut self, result_id: RecordId) -> Self {
        self.result_video_id = Some(result_id);
        self
    }

    /// Result reference, treating an empty id as unset.
    pub fn result_ref(&self) -> Option<&RecordId> {
        self.result_video_id.as_ref().filter(|id| !id.is_empty())
    }

    /// Reset identity and timestamps before the first write.
    pub fn fresh(mut self) -> Self {
        let now = Utc::now();
        self.id = RecordId::generate();
        self.created_at = now;
        self.updated_at = now;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ValidationError::MissingField("url"));
        }

        match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
            Ok(parsed) => Err(ValidationError::InvalidValue {
                field: "url",
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            }),
            Err(e) => Err(ValidationError::InvalidValue {
                field: "url",
                reason: e.to_string(),
            }),
        }
    }
}

/// One distinct finished MP4, addressed by the MD5 of its bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResultVideoRecord {
    pub id: RecordId,

    /// Hex MD5 digest of the uploaded file
    #[serde(rename = "md5")]
    pub content_hash: String,

    /// Public retrieval URL
    pub url: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ResultVideoRecord {
    pub fn new(content_hash: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_id(RecordId::generate(), content_hash, url)
    }

    /// Create with a pre-allocated id (the upload key is derived from it).
    pub fn with_id(id: RecordId, content_hash: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            content_hash: content_hash.into(),
            url: url.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.content_hash.trim().is_empty() {
            return Err(ValidationError::MissingField("md5"));
        }
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingField("url"));
        }
        Ok(())
    }
}
