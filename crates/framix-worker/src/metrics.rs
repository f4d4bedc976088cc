//! Prometheus metrics for the worker.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its scrape listener.
pub fn init_metrics(port: u16) {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .expect("Failed to install Prometheus recorder");
}

/// Metric names as constants for consistency.
pub mod names {
    // Consumption metrics
    pub const EVENTS_CONSUMED_TOTAL: &str = "framix_events_consumed_total";
    pub const EVENTS_POISON_TOTAL: &str = "framix_events_poison_total";

    // Pipeline metrics
    pub const VIDEOS_FINISHED_TOTAL: &str = "framix_videos_finished_total";
    pub const VIDEOS_FAILED_TOTAL: &str = "framix_videos_failed_total";
    pub const VIDEOS_MISSING_TOTAL: &str = "framix_videos_missing_total";
    pub const ALREADY_PROCESSING_TOTAL: &str = "framix_already_processing_total";
    pub const STORE_UNAVAILABLE_TOTAL: &str = "framix_store_unavailable_total";
    pub const PROCESSING_DURATION_SECONDS: &str = "framix_processing_duration_seconds";

    // Dead-letter metrics
    pub const DLQ_ROUTED_TOTAL: &str = "framix_dlq_routed_total";
    pub const DLQ_RETRY_SUCCESS_TOTAL: &str = "framix_dlq_retry_success_total";
    pub const DLQ_RETRY_FAILED_TOTAL: &str = "framix_dlq_retry_failed_total";
}

/// Record one consumed entry.
pub fn record_consumed(channel: &'static str) {
    counter!(names::EVENTS_CONSUMED_TOTAL, "channel" => channel).increment(1);
}

/// Record one undecodable entry dropped at the boundary.
pub fn record_poison(channel: &'static str) {
    counter!(names::EVENTS_POISON_TOTAL, "channel" => channel).increment(1);
}

/// Record a completed pipeline run.
pub fn record_finished(duration_secs: f64) {
    counter!(names::VIDEOS_FINISHED_TOTAL).increment(1);
    histogram!(names::PROCESSING_DURATION_SECONDS).record(duration_secs);
}

/// Record a failed pipeline run.
pub fn record_failed(cause: &'static str, duration_secs: f64) {
    counter!(names::VIDEOS_FAILED_TOTAL, "cause" => cause).increment(1);
    histogram!(names::PROCESSING_DURATION_SECONDS).record(duration_secs);
}

/// Record an event whose video no longer exists.
pub fn record_video_missing() {
    counter!(names::VIDEOS_MISSING_TOTAL).increment(1);
}

/// Record a delivery skipped because another holder has the lock.
pub fn record_already_processing() {
    counter!(names::ALREADY_PROCESSING_TOTAL).increment(1);
}

/// Record a pipeline run aborted by an unreachable store.
pub fn record_store_unavailable() {
    counter!(names::STORE_UNAVAILABLE_TOTAL).increment(1);
}

/// Record an envelope routed to the dead-letter channel.
pub fn record_dlq_routed() {
    counter!(names::DLQ_ROUTED_TOTAL).increment(1);
}

/// Record the outcome of a dead-letter retry pass.
pub fn record_dlq_retry(success: bool) {
    if success {
        counter!(names::DLQ_RETRY_SUCCESS_TOTAL).increment(1);
    } else {
        counter!(names::DLQ_RETRY_FAILED_TOTAL).increment(1);
    }
}
