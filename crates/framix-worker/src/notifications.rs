//! Outcome notification content.
//!
//! Bodies are plain text, addressed by the uploader's display name when one
//! was captured at upload time.

use crate::pipeline::ProcessingFailure;

/// Subject and body for one outcome email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeNotification {
    pub subject: String,
    pub body: String,
}

const SUCCESS_SUBJECT: &str = "Your video is ready - Framix";
const FAILURE_SUBJECT: &str = "Video processing failed - Framix";

/// Notification for a finished video.
pub fn success_notification(
    user_name: Option<&str>,
    file_name: &str,
    frame_count: u32,
) -> OutcomeNotification {
    let body = format!(
        "Hi {},\n\n\
         Your video \"{}\" has been processed successfully.\n\
         We extracted {} frames and bundled them into a zip archive,\n\
         ready for download from your account.\n\n\
         Thanks for using Framix.",
        greeting(user_name),
        file_name,
        frame_count,
    );
    OutcomeNotification {
        subject: SUCCESS_SUBJECT.to_string(),
        body,
    }
}

/// Notification for a failed video, with remediation advice matching the
/// failure kind.
pub fn failure_notification(
    user_name: Option<&str>,
    file_name: &str,
    failure: &ProcessingFailure,
) -> OutcomeNotification {
    let advice = match failure {
        ProcessingFailure::NoFrames => {
            "We could not extract any frames from it. The file may be corrupt\n\
             or in an unsupported format. Please check the file and try\n\
             uploading it again."
        }
        ProcessingFailure::Archive { .. } => {
            "Your frames were extracted, but packaging them failed due to an\n\
             internal error on our side. Please try again later; no action is\n\
             needed on the file itself."
        }
        ProcessingFailure::Extraction { .. } | ProcessingFailure::Workspace { .. } => {
            "Something went wrong while processing it. Please try uploading\n\
             the file again, and contact support if the problem persists."
        }
    };

    let body = format!(
        "Hi {},\n\n\
         Unfortunately we could not process your video \"{}\".\n\
         {}\n\n\
         Thanks for using Framix.",
        greeting(user_name),
        file_name,
        advice,
    );
    OutcomeNotification {
        subject: FAILURE_SUBJECT.to_string(),
        body,
    }
}

fn greeting(user_name: Option<&str>) -> &str {
    match user_name {
        Some(name) if !name.trim().is_empty() => name,
        _ => "there",
    }
}
