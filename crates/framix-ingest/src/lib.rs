//! Upload ingestion.
//!
//! Validates an incoming video upload, stores the raw file under a durable
//! path, persists the initial record and publishes the processing event.

pub mod error;
pub mod upload;

pub use error::{UploadError, UploadResult};
pub use upload::{is_supported_format, RawUpload, UploadConfig, UploadCoordinator};
