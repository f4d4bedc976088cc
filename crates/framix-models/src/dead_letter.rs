//! Dead-letter envelopes for failed events.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::event::VideoEvent;

/// Envelope wrapping an event that could not be delivered or processed.
///
/// The original payload is kept opaque so the envelope survives even when
/// the event itself no longer decodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEnvelope {
    /// The failed event, verbatim
    pub original_event: serde_json::Value,

    /// Wire tag of the original event
    pub event_type: String,

    /// Human-readable failure cause
    pub failure_reason: String,

    /// Failure time, epoch milliseconds
    pub failure_timestamp: i64,

    /// Debug rendering of the underlying error chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    /// Channel the event was originally published to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_topic: Option<String>,
}

impl DeadLetterEnvelope {
    /// Create an envelope around a raw payload, stamped with the current time.
    pub fn new(
        original_event: serde_json::Value,
        event_type: impl Into<String>,
        failure_reason: impl Into<String>,
    ) -> Self {
        Self {
            original_event,
            event_type: event_type.into(),
            failure_reason: failure_reason.into(),
            failure_timestamp: Utc::now().timestamp_millis(),
            stack_trace: None,
            original_topic: None,
        }
    }

    /// Create an envelope around a typed event.
    pub fn for_event(
        event: &VideoEvent,
        failure_reason: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            serde_json::to_value(event)?,
            event.event_type(),
            failure_reason,
        ))
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    pub fn with_original_topic(mut self, topic: impl Into<String>) -> Self {
        self.original_topic = Some(topic.into());
        self
    }

    /// Try to recover the original event as a typed value.
    pub fn decode_original(&self) -> Result<VideoEvent, serde_json::Error> {
        serde_json::from_value(self.original_event.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Uploader;
    use crate::video::VideoId;
    use uuid::Uuid;

    #[test]
    fn test_envelope_wire_format() {
        let uploader = Uploader::new(Uuid::new_v4(), "ana@example.com");
        let event = VideoEvent::video_upload(VideoId::new(), &uploader);

        let envelope = DeadLetterEnvelope::for_event(&event, "broker timeout")
            .unwrap()
            .with_original_topic("video.processing.events")
            .with_stack_trace("timeout after 30s");

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["eventType"], "video_upload");
        assert_eq!(json["failureReason"], "broker timeout");
        assert_eq!(json["originalTopic"], "video.processing.events");
        assert!(json["failureTimestamp"].is_i64());
        assert_eq!(json["originalEvent"]["eventType"], "video_upload");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let envelope = DeadLetterEnvelope::new(
            serde_json::json!({"eventType": "video_upload"}),
            "video_upload",
            "processing failed",
        );
        let json = serde_json::to_value(&envelope).unwrap();

        assert!(json.get("stackTrace").is_none());
        assert!(json.get("originalTopic").is_none());
    }

    #[test]
    fn test_decode_original_roundtrip() {
        let uploader = Uploader::new(Uuid::new_v4(), "ana@example.com").with_name("Ana");
        let event = VideoEvent::video_upload(VideoId::new(), &uploader);

        let envelope = DeadLetterEnvelope::for_event(&event, "simulated").unwrap();
        let recovered = envelope.decode_original().unwrap();
        assert_eq!(recovered, event);
    }

    #[test]
    fn test_undecodable_original_still_carries_envelope() {
        let envelope = DeadLetterEnvelope::new(
            serde_json::json!({"eventType": "unknown_thing"}),
            "unknown_thing",
            "no handler",
        );

        assert!(envelope.decode_original().is_err());
        assert_eq!(envelope.event_type, "unknown_thing");
    }
}
