//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "vrddt_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vrddt_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vrddt_http_requests_in_flight";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Replace record ids and content hashes in a path with placeholders.
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.len() >= 16 && segment.chars().all(|c| c.is_ascii_hexdigit()) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/vrddt_videos/0123456789abcdef0123456789abcdef"),
            "/vrddt_videos/:id"
        );
        assert_eq!(
            sanitize_path("/reddit_videos/0123456789abcdef0123456789abcdef/vrddt_video"),
            "/reddit_videos/:id/vrddt_video"
        );
        assert_eq!(sanitize_path("/reddit_videos/queue"), "/reddit_videos/queue");
    }
}
