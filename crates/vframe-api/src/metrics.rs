//! Prometheus metrics for the API server.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vframe_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vframe_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vframe_http_requests_in_flight";

    // Submission metrics
    pub const JOBS_SUBMITTED_TOTAL: &str = "vframe_jobs_submitted_total";
    pub const SUBMISSIONS_FAILED_TOTAL: &str = "vframe_submissions_failed_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "vframe_upload_bytes_total";
    pub const ARCHIVES_DOWNLOADED_TOTAL: &str = "vframe_archives_downloaded_total";
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

/// Record an accepted submission.
pub fn record_job_submitted(bytes: u64) {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes);
}

/// Record a rejected or failed submission.
pub fn record_submission_failed(reason: &'static str) {
    counter!(names::SUBMISSIONS_FAILED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_archive_downloaded() {
    counter!(names::ARCHIVES_DOWNLOADED_TOTAL).increment(1);
}

fn numeric_segment() -> Option<&'static Regex> {
    static NUMERIC: OnceLock<Option<Regex>> = OnceLock::new();
    NUMERIC.get_or_init(|| Regex::new(r"/[0-9]+(/|$)").ok()).as_ref()
}

/// Sanitize path for metrics labels (replace job ids with a placeholder).
fn sanitize_path(path: &str) -> String {
    match numeric_segment() {
        Some(re) => re.replace_all(path, "/:id$1").into_owned(),
        None => path.to_string(),
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/videos/42/download"), "/videos/:id/download");
        assert_eq!(sanitize_path("/videos/status"), "/videos/status");
        assert_eq!(sanitize_path("/videos/42"), "/videos/:id");
    }
}
