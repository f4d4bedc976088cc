//! The per-video processing pipeline.
//!
//! One delivered event runs the sequence lock → extract → archive →
//! persist → notify, with scoped workspace cleanup on every exit path.
//! The pipeline owns no bus handle: acknowledgment and dead-letter routing
//! stay with the consumer driving it.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use framix_bus::{DistributedLock, StatusCache};
use framix_media::{Archiver, FrameExtractor};
use framix_models::{Video, VideoEvent};
use framix_notify::Notifier;
use framix_store::StatusStore;

use crate::config::WorkerConfig;
use crate::notifications::{self, OutcomeNotification};

/// Collaborators the pipeline runs against.
pub struct PipelineContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn StatusStore>,
    pub extractor: Arc<dyn FrameExtractor>,
    pub archiver: Arc<dyn Archiver>,
    pub notifier: Arc<dyn Notifier>,
    pub lock: Arc<dyn DistributedLock>,
    pub cache: Arc<dyn StatusCache>,
}

/// Which delivery attempt is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPass {
    /// First delivery from the processing channel
    Initial,
    /// The one bounded remediation pass from the dead-letter channel
    DlqRetry,
}

impl RetryPass {
    pub fn is_dlq_retry(&self) -> bool {
        matches!(self, RetryPass::DlqRetry)
    }
}

/// Why a processing attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingFailure {
    /// The extraction tool reported failure
    Extraction {
        exit_code: Option<i32>,
        detail: String,
    },
    /// The tool exited cleanly but produced nothing; usually a corrupt or
    /// unsupported input
    NoFrames,
    /// Frames existed but bundling them failed
    Archive { detail: String },
    /// The per-video workspace could not be prepared
    Workspace { detail: String },
}

impl ProcessingFailure {
    /// Short cause label for metrics.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::Extraction { .. } => "extraction",
            Self::NoFrames => "no_frames",
            Self::Archive { .. } => "archive",
            Self::Workspace { .. } => "workspace",
        }
    }

    /// The message persisted as the record's `error_message`.
    pub fn status_message(&self, pass: RetryPass) -> String {
        let base = match self {
            Self::Extraction {
                exit_code: Some(code),
                ..
            } => format!("Frame extraction failed with exit code {code}"),
            Self::Extraction { detail, .. } => format!("Frame extraction failed: {detail}"),
            Self::NoFrames => "No frames could be extracted from the video".to_string(),
            Self::Archive { detail } => format!("Failed to create the frame bundle: {detail}"),
            Self::Workspace { detail } => {
                format!("Could not prepare the processing workspace: {detail}")
            }
        };
        if pass.is_dlq_retry() {
            format!("{base} after DLQ retry")
        } else {
            base
        }
    }
}

/// How a delivered event resolved.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Bundle produced, record at `Finished`
    Finished { frame_count: u32, zip_path: String },
    /// Record at `Error`; the consumer decides on dead-letter routing
    Failed { failure: ProcessingFailure },
    /// Another holder has the lock; duplicate delivery, nothing done
    AlreadyProcessing,
    /// The record does not exist; event dropped
    VideoMissing,
    /// The store could not even be asked; nothing was done
    StoreUnavailable { detail: String },
}

/// Run the full pipeline for one delivered event.
pub async fn process_event(
    ctx: &PipelineContext,
    event: &VideoEvent,
    pass: RetryPass,
) -> PipelineOutcome {
    let video_id = event.video_id();

    let video = match ctx.store.find_by_id(video_id).await {
        Ok(Some(video)) => video,
        Ok(None) => {
            debug!(%video_id, "Event for unknown video, dropping");
            return PipelineOutcome::VideoMissing;
        }
        Err(e) => {
            warn!(%video_id, "Status store unreachable: {e}");
            return PipelineOutcome::StoreUnavailable {
                detail: e.to_string(),
            };
        }
    };

    if !ctx.lock.acquire(video_id).await {
        info!(%video_id, "Lock held elsewhere, skipping duplicate delivery");
        return PipelineOutcome::AlreadyProcessing;
    }

    let outcome = run_locked(ctx, video, event, pass).await;
    ctx.lock.release(video_id).await;
    outcome
}

async fn run_locked(
    ctx: &PipelineContext,
    mut video: Video,
    event: &VideoEvent,
    pass: RetryPass,
) -> PipelineOutcome {
    info!(video_id = %video.id, ?pass, path = %video.original_path, "Processing started");

    video.mark_processing();
    persist_status(ctx, &video).await;

    match extract_and_archive(ctx, &video).await {
        Ok((frame_count, zip_path)) => {
            video.mark_finished(&zip_path, frame_count);
            persist_status(ctx, &video).await;

            deliver(
                ctx,
                event,
                notifications::success_notification(
                    event.user_name(),
                    &file_label(&video),
                    frame_count,
                ),
            )
            .await;

            info!(video_id = %video.id, frame_count, zip_path = %zip_path, "Processing finished");
            PipelineOutcome::Finished {
                frame_count,
                zip_path,
            }
        }
        Err(failure) => {
            let message = failure.status_message(pass);
            video.mark_error(&message);
            persist_status(ctx, &video).await;

            deliver(
                ctx,
                event,
                notifications::failure_notification(
                    event.user_name(),
                    &file_label(&video),
                    &failure,
                ),
            )
            .await;

            warn!(video_id = %video.id, cause = failure.cause(), "Processing failed: {message}");
            PipelineOutcome::Failed { failure }
        }
    }
}

/// Extract frames into a scoped workspace and bundle them.
///
/// The workspace is a `TempDir`, so it is removed on every exit path of
/// this function, success and failure alike.
async fn extract_and_archive(
    ctx: &PipelineContext,
    video: &Video,
) -> Result<(u32, String), ProcessingFailure> {
    tokio::fs::create_dir_all(&ctx.config.work_dir)
        .await
        .map_err(|e| ProcessingFailure::Workspace {
            detail: e.to_string(),
        })?;

    let workspace = tempfile::Builder::new()
        .prefix(&format!("frames-{}-", video.id))
        .tempdir_in(&ctx.config.work_dir)
        .map_err(|e| ProcessingFailure::Workspace {
            detail: e.to_string(),
        })?;

    let frames = ctx
        .extractor
        .extract(Path::new(&video.original_path), workspace.path())
        .await
        .map_err(|e| ProcessingFailure::Extraction {
            exit_code: e.exit_code(),
            detail: e.to_string(),
        })?;

    if frames.is_empty() {
        return Err(ProcessingFailure::NoFrames);
    }
    info!(video_id = %video.id, frames = frames.len(), "Frames extracted");

    let bundle_name = format!("frames_{}_{}.zip", video.id, Utc::now().format("%Y%m%d%H%M%S"));
    let dest = ctx.config.output_dir.join(bundle_name);

    let bytes = ctx
        .archiver
        .archive(&frames, &dest)
        .await
        .map_err(|e| ProcessingFailure::Archive {
            detail: e.to_string(),
        })?;
    info!(video_id = %video.id, bytes, "Frame bundle created");

    Ok((frames.len() as u32, dest.to_string_lossy().into_owned()))
}

/// Persist the current record state, mirroring it to the status cache.
/// Both writes are log-and-continue; the pipeline never aborts on them.
async fn persist_status(ctx: &PipelineContext, video: &Video) {
    if let Err(e) = ctx.store.save(video.clone()).await {
        error!(video_id = %video.id, status = %video.status, "Failed to persist status: {e}");
    }
    ctx.cache.put_status(video.id, video.status).await;
}

async fn deliver(ctx: &PipelineContext, event: &VideoEvent, notification: OutcomeNotification) {
    if let Err(e) = ctx
        .notifier
        .send(event.user_email(), &notification.subject, &notification.body)
        .await
    {
        warn!(to = event.user_email(), "Failed to send outcome notification: {e}");
    }
}

fn file_label(video: &Video) -> String {
    Path::new(&video.original_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| video.original_path.clone())
}
