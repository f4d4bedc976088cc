//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent consumer tasks on the processing channel; partitions are
    /// split among them, so ordering per partition is preserved
    pub consumer_concurrency: usize,
    /// Concurrent consumer tasks on the dead-letter channel
    pub dlq_consumer_concurrency: usize,
    /// How long one read blocks waiting for new entries
    pub read_block: Duration,
    /// How often each task scans for orphaned pending entries
    pub claim_interval: Duration,
    /// Minimum idle time before a pending entry can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Directory per-video frame workspaces are created under
    pub work_dir: PathBuf,
    /// Directory finished frame bundles land in
    pub output_dir: PathBuf,
    /// Route processing failures to the dead-letter channel for one retry
    pub route_failures_to_dlq: bool,
    /// Port the Prometheus exporter listens on
    pub metrics_port: u16,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            consumer_concurrency: 3,
            dlq_consumer_concurrency: 1,
            read_block: Duration::from_secs(1),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300), // 5 minutes
            work_dir: PathBuf::from("temp"),
            output_dir: PathBuf::from("outputs"),
            route_failures_to_dlq: true,
            metrics_port: 9100,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            consumer_concurrency: std::env::var("WORKER_CONSUMER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            dlq_consumer_concurrency: std::env::var("WORKER_DLQ_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1),
            read_block: Duration::from_millis(
                std::env::var("WORKER_READ_BLOCK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("temp")),
            output_dir: std::env::var("WORKER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("outputs")),
            route_failures_to_dlq: std::env::var("ROUTE_FAILURES_TO_DLQ")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(9100),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}
