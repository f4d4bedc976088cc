//! Events published on the processing channel.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::video::VideoId;

/// Identity of the user who uploaded a video.
///
/// Carried on events so consumers can notify the owner without a
/// user-store round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Uploader {
    /// User ID (owner)
    pub id: Uuid,
    /// Notification address
    pub email: String,
    /// Display name, when the account has one
    pub name: Option<String>,
}

impl Uploader {
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// An event on the processing channel.
///
/// The wire form carries an `eventType` tag so consumers can dispatch
/// without trial deserialization; unknown tags fail decoding and are
/// handled as poison at the consumer boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "snake_case")]
pub enum VideoEvent {
    /// A new upload is ready for frame extraction.
    #[serde(rename_all = "camelCase")]
    VideoUpload {
        video_id: VideoId,
        user_id: Uuid,
        user_email: String,
        user_name: Option<String>,
    },
}

impl VideoEvent {
    /// Build the upload event for a video owned by `uploader`.
    pub fn video_upload(video_id: VideoId, uploader: &Uploader) -> Self {
        Self::VideoUpload {
            video_id,
            user_id: uploader.id,
            user_email: uploader.email.clone(),
            user_name: uploader.name.clone(),
        }
    }

    /// The wire tag of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            VideoEvent::VideoUpload { .. } => "video_upload",
        }
    }

    /// The subject video.
    pub fn video_id(&self) -> VideoId {
        match self {
            VideoEvent::VideoUpload { video_id, .. } => *video_id,
        }
    }

    /// Partition key: all events for one video share a key, so they land
    /// on the same ordered partition.
    pub fn partition_key(&self) -> String {
        format!("video-{}", self.video_id())
    }

    /// Notification address of the uploader.
    pub fn user_email(&self) -> &str {
        match self {
            VideoEvent::VideoUpload { user_email, .. } => user_email,
        }
    }

    /// Display name of the uploader, when known.
    pub fn user_name(&self) -> Option<&str> {
        match self {
            VideoEvent::VideoUpload { user_name, .. } => user_name.as_deref(),
        }
    }
}
