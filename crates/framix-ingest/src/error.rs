//! Upload error types.

use thiserror::Error;

/// Result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors that can occur while accepting an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("Unsupported video format: {0}")]
    UnsupportedFormat(String),

    #[error("Store error: {0}")]
    Store(#[from] framix_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Whether this is a client-side validation failure, as opposed to an
    /// infrastructure one.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyFile | Self::UnsupportedFormat(_))
    }
}
