//! Frame-extraction worker.
//!
//! Consumes upload events off the partitioned bus, runs each one through
//! the per-video pipeline (lock, extract, archive, persist, notify) and
//! gives dead-lettered events a single remediation pass.

pub mod config;
pub mod consumer;
pub mod dlq;
pub mod metrics;
pub mod notifications;
pub mod pipeline;

pub use config::WorkerConfig;
pub use consumer::ProcessingConsumer;
pub use dlq::DlqConsumer;
pub use pipeline::{
    process_event, PipelineContext, PipelineOutcome, ProcessingFailure, RetryPass,
};
