//! FFmpeg frame extraction and frame bundle archiving.
//!
//! This crate wraps the two external media steps of the pipeline:
//! - [`FrameExtractor`]: sample still frames out of a video file
//! - [`Archiver`]: bundle the sampled frames into a single zip artifact
//!
//! Both are trait seams so the processing pipeline stays testable without
//! FFmpeg on the path.

pub mod archive;
pub mod error;
pub mod extractor;

pub use archive::{Archiver, ZipArchiver};
pub use error::{MediaError, MediaResult};
pub use extractor::{FfmpegExtractor, FrameExtractor};
