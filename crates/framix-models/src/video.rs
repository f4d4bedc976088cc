//! Video record and processing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub Uuid);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string representation.
    pub fn parse_str(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for VideoId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Video processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStatus {
    /// Upload accepted, processing not yet started
    #[default]
    Uploaded,
    /// A worker holds the lock and is extracting frames
    Processing,
    /// Frame bundle produced successfully
    Finished,
    /// Processing failed; `error_message` records the cause
    Error,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "UPLOADED",
            VideoStatus::Processing => "PROCESSING",
            VideoStatus::Finished => "FINISHED",
            VideoStatus::Error => "ERROR",
        }
    }

    /// Check if this is a terminal state (only the DLQ retry path leaves it).
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Finished | VideoStatus::Error)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A video record as persisted in the status store.
///
/// Field invariants are maintained by the transition methods:
/// `zip_path` and `frame_count` are set iff the status is `Finished`,
/// and `error_message` is set iff the status is `Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    /// Unique video ID, assigned at upload and immutable afterwards
    pub id: VideoId,

    /// Owner of the upload
    pub user_id: Uuid,

    /// Durable path of the stored original file
    pub original_path: String,

    /// Path of the produced frame bundle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_path: Option<String>,

    /// Number of frames in the bundle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u32>,

    /// Size of the original file in bytes
    pub file_size: u64,

    /// Lifecycle status
    #[serde(default)]
    pub status: VideoStatus,

    /// Upload timestamp
    pub uploaded_at: DateTime<Utc>,

    /// Failure cause, present only in the `Error` status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Video {
    /// Create a freshly uploaded record.
    pub fn new(user_id: Uuid, original_path: impl Into<String>, file_size: u64) -> Self {
        Self {
            id: VideoId::new(),
            user_id,
            original_path: original_path.into(),
            zip_path: None,
            frame_count: None,
            file_size,
            status: VideoStatus::Uploaded,
            uploaded_at: Utc::now(),
            error_message: None,
        }
    }

    /// Enter the `Processing` state, clearing any previous outcome fields.
    ///
    /// Also used by the DLQ retry path, which re-processes a record that
    /// already rests at `Error`.
    pub fn mark_processing(&mut self) {
        self.status = VideoStatus::Processing;
        self.zip_path = None;
        self.frame_count = None;
        self.error_message = None;
    }

    /// Enter the `Finished` state with the produced bundle.
    pub fn mark_finished(&mut self, zip_path: impl Into<String>, frame_count: u32) {
        self.status = VideoStatus::Finished;
        self.zip_path = Some(zip_path.into());
        self.frame_count = Some(frame_count);
        self.error_message = None;
    }

    /// Enter the `Error` state with a failure cause.
    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = VideoStatus::Error;
        self.zip_path = None;
        self.frame_count = None;
        self.error_message = Some(message.into());
    }

    /// Check if the record is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&VideoStatus::Finished).unwrap();
        assert_eq!(json, "\"FINISHED\"");

        let parsed: VideoStatus = serde_json::from_str("\"UPLOADED\"").unwrap();
        assert_eq!(parsed, VideoStatus::Uploaded);
    }

    #[test]
    fn test_new_video_starts_uploaded() {
        let video = Video::new(Uuid::new_v4(), "uploads/a.mp4", 1024);
        assert_eq!(video.status, VideoStatus::Uploaded);
        assert!(video.zip_path.is_none());
        assert!(video.frame_count.is_none());
        assert!(video.error_message.is_none());
        assert!(!video.is_terminal());
    }

    #[test]
    fn test_finished_sets_outcome_fields() {
        let mut video = Video::new(Uuid::new_v4(), "uploads/a.mp4", 1024);
        video.mark_processing();
        video.mark_finished("outputs/frames_a.zip", 42);

        assert_eq!(video.status, VideoStatus::Finished);
        assert_eq!(video.zip_path.as_deref(), Some("outputs/frames_a.zip"));
        assert_eq!(video.frame_count, Some(42));
        assert!(video.error_message.is_none());
        assert!(video.is_terminal());
    }

    #[test]
    fn test_error_clears_outcome_fields() {
        let mut video = Video::new(Uuid::new_v4(), "uploads/a.mp4", 1024);
        video.mark_finished("outputs/frames_a.zip", 42);
        video.mark_error("extraction failed");

        assert_eq!(video.status, VideoStatus::Error);
        assert!(video.zip_path.is_none());
        assert!(video.frame_count.is_none());
        assert_eq!(video.error_message.as_deref(), Some("extraction failed"));
    }

    #[test]
    fn test_retry_success_clears_error_message() {
        let mut video = Video::new(Uuid::new_v4(), "uploads/a.mp4", 1024);
        video.mark_error("first attempt failed");
        video.mark_processing();
        assert!(video.error_message.is_none());

        video.mark_finished("outputs/frames_a.zip", 7);
        assert!(video.error_message.is_none());
        assert_eq!(video.status, VideoStatus::Finished);
    }

    #[test]
    fn test_video_json_uses_camel_case() {
        let video = Video::new(Uuid::new_v4(), "uploads/a.mp4", 2048);
        let json = serde_json::to_value(&video).unwrap();

        assert!(json.get("userId").is_some());
        assert!(json.get("originalPath").is_some());
        assert!(json.get("fileSize").is_some());
        assert!(json.get("uploadedAt").is_some());
        // Unset optionals are omitted entirely
        assert!(json.get("zipPath").is_none());
        assert!(json.get("errorMessage").is_none());
    }
}
