//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use vrddt_coordinator::CoordinatorError;
use vrddt_queue::QueueError;
use vrddt_store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Queue error: {0}")]
    Queue(QueueError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Queue(QueueError::QueueFull { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Consistency(_) | ApiError::Internal(_) | ApiError::Store(_) | ApiError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Timeout(_) => "timeout",
            ApiError::Consistency(_) => "consistency",
            ApiError::Upstream(_) => "upstream",
            ApiError::Unavailable(_) | ApiError::Queue(QueueError::QueueFull { .. }) => "unavailable",
            ApiError::Internal(_) | ApiError::Store(_) | ApiError::Queue(_) => "internal",
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code().is_server_error() && !matches!(self, ApiError::Timeout(_))
    }

    /// Client-facing detail; server-side failures are masked in production.
    pub fn detail(&self, production: bool) -> String {
        if production && self.is_internal() {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::BrokenReference { .. } => Self::Consistency(e.to_string()),
            StoreError::Unavailable(msg) => Self::Unavailable(msg),
            other => Self::Store(other),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        match e {
            CoordinatorError::InvalidUrl(msg) => Self::BadRequest(format!("invalid URL: {}", msg)),
            CoordinatorError::NotFound(what) => Self::NotFound(what),
            CoordinatorError::Timeout { .. } => Self::Timeout(e.to_string()),
            CoordinatorError::Consistency(msg) => Self::Consistency(msg),
            CoordinatorError::Store(store) => store.into(),
            CoordinatorError::Queue(queue) => queue.into(),
            CoordinatorError::Resolve(media) => Self::Upstream(media.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_internal() {
            error!(code = self.code(), "Request failed: {}", self);
        }

        let production = std::env::var("ENVIRONMENT")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let body = ErrorResponse {
            detail: self.detail(production),
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}
