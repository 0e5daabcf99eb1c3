//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while fetching, converting or hashing media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Too many redirects (>{0}) for {1}")]
    TooManyRedirects(usize, String),

    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Metadata for {0} has no title")]
    MissingTitle(String),

    #[error("Metadata for {0} has no video URL")]
    MissingVideoUrl(String),

    #[error("Video URL {0} has no DASH marker, no separate audio")]
    NoAudioMarker(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    pub fn invalid_url(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Domain conditions of a post rather than failures of the pipeline.
    /// Logged at warn level and not counted against the worker.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::MissingTitle(_)
                | Self::MissingVideoUrl(_)
                | Self::NoAudioMarker(_)
                | Self::InvalidMetadata(_)
        )
    }

    /// The input URL itself is unusable.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidUrl { .. } | Self::TooManyRedirects(..))
            || matches!(self, Self::HttpStatus { status, .. } if (400..500).contains(status))
    }
}
