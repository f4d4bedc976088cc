//! Frame bundle archiving.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{MediaError, MediaResult};

/// Bundles a set of files into one compressed artifact.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Write `files` into a zip archive at `dest`, returning the archive
    /// size in bytes. Entries keep their file names, flat.
    async fn archive(&self, files: &[PathBuf], dest: &Path) -> MediaResult<u64>;
}

/// [`Archiver`] backed by the `zip` crate with deflate compression.
#[derive(Debug, Clone, Default)]
pub struct ZipArchiver;

impl ZipArchiver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Archiver for ZipArchiver {
    async fn archive(&self, files: &[PathBuf], dest: &Path) -> MediaResult<u64> {
        let files = files.to_vec();
        let dest = dest.to_path_buf();

        // The zip writer is synchronous; keep it off the async runtime.
        let size = tokio::task::spawn_blocking(move || write_archive(&files, &dest))
            .await
            .map_err(|e| MediaError::internal(format!("archive task panicked: {e}")))??;

        debug!(bytes = size, "Frame bundle written");
        Ok(size)
    }
}

fn write_archive(files: &[PathBuf], dest: &Path) -> MediaResult<u64> {
    if let Some(parent) = dest.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = ZipWriter::new(File::create(dest)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| MediaError::internal(format!("unnamed entry: {}", path.display())))?;

        writer.start_file(name, options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut writer)?;
    }

    let file = writer.finish()?;
    Ok(file.metadata()?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn write_fixture(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_archive_bundles_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write_fixture(dir.path(), "frame_0001.png", b"first"),
            write_fixture(dir.path(), "frame_0002.png", b"second"),
        ];
        let dest = dir.path().join("bundle.zip");

        let size = ZipArchiver::new().archive(&files, &dest).await.unwrap();
        assert!(size > 0);

        let mut archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);

        let mut entry = archive.by_name("frame_0001.png").unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "first");
    }

    #[tokio::test]
    async fn test_archive_keeps_flat_entry_names() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deep").join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        let files = vec![write_fixture(&nested, "frame_0001.png", b"x")];
        let dest = dir.path().join("bundle.zip");

        ZipArchiver::new().archive(&files, &dest).await.unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        assert!(archive.by_name("frame_0001.png").is_ok());
    }

    #[tokio::test]
    async fn test_archive_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![dir.path().join("frame_9999.png")];
        let dest = dir.path().join("bundle.zip");

        let err = ZipArchiver::new().archive(&files, &dest).await.unwrap_err();
        assert!(matches!(err, MediaError::Io(_)));
    }

    #[tokio::test]
    async fn test_archive_creates_destination_directory() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![write_fixture(dir.path(), "frame_0001.png", b"x")];
        let dest = dir.path().join("out").join("bundle.zip");

        ZipArchiver::new().archive(&files, &dest).await.unwrap();
        assert!(dest.exists());
    }
}
