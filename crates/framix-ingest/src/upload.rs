//! Upload coordination.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use framix_bus::{EventBus, PublishOutcome};
use framix_models::{Uploader, Video, VideoEvent};
use framix_store::StatusStore;

use crate::error::{UploadError, UploadResult};

/// Extensions accepted for upload, matched case-insensitively.
const SUPPORTED_EXTENSIONS: [&str; 7] =
    [".mp4", ".avi", ".mov", ".mkv", ".wmv", ".flv", ".webm"];

/// An upload as received from the outer surface.
#[derive(Debug, Clone)]
pub struct RawUpload {
    /// Client-provided file name, used for format validation
    pub file_name: String,
    /// Raw file content
    pub content: Vec<u8>,
}

impl RawUpload {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
        }
    }
}

/// Upload configuration.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Directory original files are stored under
    pub upload_dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

impl UploadConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
        }
    }
}

/// Accepts uploads: validate, store, persist, publish.
pub struct UploadCoordinator {
    store: Arc<dyn StatusStore>,
    bus: Arc<EventBus>,
    config: UploadConfig,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn StatusStore>, bus: Arc<EventBus>, config: UploadConfig) -> Self {
        Self { store, bus, config }
    }

    /// Accept one upload.
    ///
    /// On success the original file is durably stored, the record exists at
    /// `Uploaded`, and the processing event has been published (or redirected
    /// per the publish contract). Publish degradation never fails the upload;
    /// the accepted record is the source of truth.
    pub async fn execute(&self, upload: RawUpload, uploader: &Uploader) -> UploadResult<Video> {
        validate(&upload)?;

        tokio::fs::create_dir_all(&self.config.upload_dir).await?;
        let stored_name = timestamped_name(&upload.file_name, Utc::now());
        let path = self.config.upload_dir.join(&stored_name);
        tokio::fs::write(&path, &upload.content).await?;

        let video = Video::new(
            uploader.id,
            path.to_string_lossy(),
            upload.content.len() as u64,
        );
        let video = self.store.save(video).await?;

        let event = VideoEvent::video_upload(video.id, uploader);
        match self.bus.publish(&event).await {
            Ok(PublishOutcome::Delivered { partition, .. }) => {
                info!(video_id = %video.id, partition, "Processing event published");
            }
            Ok(PublishOutcome::DeadLettered { reason }) => {
                warn!(video_id = %video.id, reason, "Processing event dead-lettered at publish");
            }
            Ok(PublishOutcome::Lost { reason }) => {
                error!(video_id = %video.id, reason, "Processing event lost at publish");
            }
            Err(e) => {
                error!(video_id = %video.id, "Could not build processing event: {e}");
            }
        }

        info!(
            video_id = %video.id,
            user_id = %uploader.id,
            file = %stored_name,
            size = video.file_size,
            "Upload accepted"
        );
        Ok(video)
    }
}

/// Check a file name against the supported extension list.
pub fn is_supported_format(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    SUPPORTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn validate(upload: &RawUpload) -> UploadResult<()> {
    if upload.content.is_empty() {
        return Err(UploadError::EmptyFile);
    }
    if !is_supported_format(&upload.file_name) {
        return Err(UploadError::UnsupportedFormat(upload.file_name.clone()));
    }
    Ok(())
}

/// Collision-resistant stored name: timestamp prefix plus the original name.
fn timestamped_name(original: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", now.format("%Y%m%d_%H%M%S"), original)
}
