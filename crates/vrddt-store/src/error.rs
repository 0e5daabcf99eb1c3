//! Content store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing matched; callers use this to drive dedup short-circuits.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// A source record references a result record that does not exist.
    #[error("Source record {source_id} references missing result record {result_id}")]
    BrokenReference { source_id: String, result_id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => !e.is_decode(),
            Self::RateLimited(_) | Self::Unavailable(_) => true,
            Self::ServerError(status, _) => *status >= 500,
            _ => false,
        }
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_http_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 => Self::AuthError(body),
            403 => Self::PermissionDenied(body),
            404 => Self::NotFound(body),
            409 => Self::AlreadyExists(body),
            429 => Self::RateLimited(1000),
            500..=599 => Self::ServerError(status, body),
            _ => Self::RequestFailed(format!("HTTP {}: {}", status, body)),
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(status, _) => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http_status() {
        assert!(StoreError::from_http_status(404, "x").is_not_found());
        assert!(StoreError::from_http_status(409, "x").is_already_exists());
        assert!(matches!(StoreError::from_http_status(503, "x"), StoreError::ServerError(503, _)));
        assert!(matches!(StoreError::from_http_status(400, "x"), StoreError::RequestFailed(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(StoreError::ServerError(502, "bad gateway".into()).is_retryable());
        assert!(StoreError::RateLimited(10).is_retryable());
        assert!(!StoreError::not_found("x").is_retryable());
        assert!(!StoreError::already_exists("x").is_retryable());
    }

    #[test]
    fn test_http_status_round_trip() {
        for status in [401u16, 403, 404, 409, 429, 500, 503] {
            assert_eq!(StoreError::from_http_status(status, "").http_status(), Some(status));
        }
    }
}
