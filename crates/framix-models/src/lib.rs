//! Shared data models for the Framix pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - The video record and its processing lifecycle
//! - Upload events published on the processing channel
//! - Dead-letter envelopes for failed events

pub mod dead_letter;
pub mod event;
pub mod video;

// Re-export common types
pub use dead_letter::DeadLetterEnvelope;
pub use event::{Uploader, VideoEvent};
pub use video::{Video, VideoId, VideoStatus};
