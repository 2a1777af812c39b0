//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "vframe_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vframe_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vframe_jobs_failed_total";
    pub const JOBS_REDELIVERED_TOTAL: &str = "vframe_jobs_redelivered_total";
    pub const STAGE_DURATION_SECONDS: &str = "vframe_stage_duration_seconds";
    pub const FRAMES_ARCHIVED_TOTAL: &str = "vframe_frames_archived_total";
}

/// Serve metrics on `addr` in the background.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
}

pub fn record_job_completed(frames: usize) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    counter!(names::FRAMES_ARCHIVED_TOTAL).increment(frames as u64);
}

/// Record a failed job, labelled by the stage that failed.
pub fn record_job_failed(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

/// Messages for jobs already in a terminal state.
pub fn record_job_redelivered() {
    counter!(names::JOBS_REDELIVERED_TOTAL).increment(1);
}

pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}
