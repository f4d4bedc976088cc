//! Frame extraction via the FFmpeg CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Fixed sampling rate: one frame per second of video.
const SAMPLE_FPS: u32 = 1;

/// Frame file naming pattern inside the working directory.
const FRAME_PATTERN: &str = "frame_%04d.png";

/// Longest stderr excerpt carried into error values.
const STDERR_EXCERPT_LEN: usize = 2048;

/// Samples still frames out of a video file.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Extract frames from `video` into `work_dir`, returning the produced
    /// frame files in playback order.
    ///
    /// An empty result with a clean exit is possible (e.g. a container with
    /// no decodable video track) and is not an error at this layer; callers
    /// decide what zero frames means.
    async fn extract(&self, video: &Path, work_dir: &Path) -> MediaResult<Vec<PathBuf>>;
}

/// [`FrameExtractor`] backed by the `ffmpeg` binary.
#[derive(Debug, Clone, Default)]
pub struct FfmpegExtractor;

impl FfmpegExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn extract(&self, video: &Path, work_dir: &Path) -> MediaResult<Vec<PathBuf>> {
        // Check FFmpeg exists
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        if !video.exists() {
            return Err(MediaError::FileNotFound(video.to_path_buf()));
        }

        let args = build_extract_args(video, work_dir);
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let output = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt = truncate_excerpt(&stderr);
            warn!(
                exit_code = output.status.code(),
                "FFmpeg exited with non-zero status: {excerpt}"
            );
            return Err(MediaError::extraction_failed(
                "FFmpeg exited with non-zero status",
                Some(excerpt),
                output.status.code(),
            ));
        }

        collect_frames(work_dir).await
    }
}

/// Build the FFmpeg invocation: fixed-rate sampling into numbered PNGs.
fn build_extract_args(video: &Path, work_dir: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-vf".to_string(),
        format!("fps={SAMPLE_FPS}"),
        "-y".to_string(),
        work_dir.join(FRAME_PATTERN).to_string_lossy().to_string(),
    ]
}

/// Collect produced frame files, sorted by name (the `%04d` numbering makes
/// lexicographic order equal playback order).
async fn collect_frames(work_dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(work_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_frame = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("frame_") && n.ends_with(".png"))
            .unwrap_or(false);
        if is_frame {
            frames.push(path);
        }
    }

    frames.sort();
    Ok(frames)
}

fn truncate_excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_EXCERPT_LEN {
        return trimmed.to_string();
    }
    let mut end = STDERR_EXCERPT_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
