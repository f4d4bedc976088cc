//! End-to-end pipeline tests against in-process collaborators.
//!
//! Extraction is stubbed (no FFmpeg needed); archiving, locking, the status
//! store and notifications run for real, so these cover the full
//! lock → extract → archive → persist → notify sequence.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use framix_bus::{DistributedLock, InMemoryLock, NullCache, RedisStatusCache, StatusCache};
use framix_media::{Archiver, FrameExtractor, MediaError, MediaResult, ZipArchiver};
use framix_models::{Uploader, Video, VideoEvent, VideoId, VideoStatus};
use framix_notify::RecordingNotifier;
use framix_store::{InMemoryStatusStore, StatusStore, StoreError, StoreResult};
use framix_worker::{
    process_event, PipelineContext, PipelineOutcome, RetryPass, WorkerConfig,
};

/// Extractor that fabricates `frames` PNG files in the workspace.
struct StubExtractor {
    frames: usize,
}

#[async_trait]
impl FrameExtractor for StubExtractor {
    async fn extract(&self, _video: &Path, work_dir: &Path) -> MediaResult<Vec<PathBuf>> {
        let mut produced = Vec::new();
        for i in 1..=self.frames {
            let path = work_dir.join(format!("frame_{i:04}.png"));
            tokio::fs::write(&path, b"png").await?;
            produced.push(path);
        }
        Ok(produced)
    }
}

/// Stub extractor with a delay, for overlapping two deliveries.
struct SlowExtractor {
    inner: StubExtractor,
    delay: Duration,
}

#[async_trait]
impl FrameExtractor for SlowExtractor {
    async fn extract(&self, video: &Path, work_dir: &Path) -> MediaResult<Vec<PathBuf>> {
        tokio::time::sleep(self.delay).await;
        self.inner.extract(video, work_dir).await
    }
}

/// Extractor that fails the way a crashed tool does.
struct FailingExtractor {
    exit_code: i32,
}

#[async_trait]
impl FrameExtractor for FailingExtractor {
    async fn extract(&self, _video: &Path, _work_dir: &Path) -> MediaResult<Vec<PathBuf>> {
        Err(MediaError::extraction_failed(
            "simulated tool crash",
            Some("boom".to_string()),
            Some(self.exit_code),
        ))
    }
}

struct FailingArchiver;

#[async_trait]
impl Archiver for FailingArchiver {
    async fn archive(&self, _files: &[PathBuf], _dest: &Path) -> MediaResult<u64> {
        Err(MediaError::internal("simulated bundle failure"))
    }
}

/// Store where every call fails, as during a backend outage.
struct FailingStore;

#[async_trait]
impl StatusStore for FailingStore {
    async fn find_by_id(&self, _id: VideoId) -> StoreResult<Option<Video>> {
        Err(StoreError::unavailable("simulated outage"))
    }

    async fn save(&self, _video: Video) -> StoreResult<Video> {
        Err(StoreError::unavailable("simulated outage"))
    }

    async fn list_all(&self) -> StoreResult<Vec<Video>> {
        Err(StoreError::unavailable("simulated outage"))
    }
}

/// Cache that records every mirrored status write.
#[derive(Clone, Default)]
struct RecordingCache {
    puts: Arc<tokio::sync::Mutex<Vec<(VideoId, VideoStatus)>>>,
}

impl RecordingCache {
    async fn recorded(&self) -> Vec<(VideoId, VideoStatus)> {
        self.puts.lock().await.clone()
    }
}

#[async_trait]
impl StatusCache for RecordingCache {
    async fn put_status(&self, id: VideoId, status: VideoStatus) {
        self.puts.lock().await.push((id, status));
    }

    async fn get_status(&self, id: VideoId) -> Option<VideoStatus> {
        self.puts
            .lock()
            .await
            .iter()
            .rev()
            .find(|(cached, _)| *cached == id)
            .map(|(_, status)| *status)
    }
}

struct Harness {
    ctx: PipelineContext,
    store: InMemoryStatusStore,
    notifier: RecordingNotifier,
    lock: InMemoryLock,
    work_dir: PathBuf,
    _root: tempfile::TempDir,
}

fn harness(extractor: Arc<dyn FrameExtractor>, archiver: Arc<dyn Archiver>) -> Harness {
    harness_with_cache(extractor, archiver, Arc::new(NullCache::new()))
}

fn harness_with_cache(
    extractor: Arc<dyn FrameExtractor>,
    archiver: Arc<dyn Archiver>,
    cache: Arc<dyn StatusCache>,
) -> Harness {
    let root = tempfile::tempdir().expect("tempdir");
    let config = WorkerConfig {
        work_dir: root.path().join("work"),
        output_dir: root.path().join("out"),
        ..WorkerConfig::default()
    };

    let store = InMemoryStatusStore::new();
    let notifier = RecordingNotifier::new();
    let lock = InMemoryLock::default();
    let work_dir = config.work_dir.clone();

    let ctx = PipelineContext {
        config,
        store: Arc::new(store.clone()),
        extractor,
        archiver,
        notifier: Arc::new(notifier.clone()),
        lock: Arc::new(lock.clone()),
        cache,
    };

    Harness {
        ctx,
        store,
        notifier,
        lock,
        work_dir,
        _root: root,
    }
}

fn uploader() -> Uploader {
    Uploader::new(Uuid::new_v4(), "ana@example.com").with_name("Ana")
}

async fn seed(store: &InMemoryStatusStore, who: &Uploader) -> (VideoId, VideoEvent) {
    let video = Video::new(who.id, "uploads/20260823_101530_clip.mp4", 2048);
    let id = video.id;
    store.save(video).await.expect("seed save");
    (id, VideoEvent::video_upload(id, who))
}

async fn workspace_entries(work_dir: &Path) -> usize {
    let mut count = 0;
    if let Ok(mut entries) = tokio::fs::read_dir(work_dir).await {
        while let Ok(Some(_)) = entries.next_entry().await {
            count += 1;
        }
    }
    count
}

#[tokio::test]
async fn test_happy_path_finishes_video() {
    let h = harness(
        Arc::new(StubExtractor { frames: 10 }),
        Arc::new(ZipArchiver::new()),
    );
    let who = uploader();
    let (id, event) = seed(&h.store, &who).await;

    let outcome = process_event(&h.ctx, &event, RetryPass::Initial).await;

    let (frame_count, zip_path) = match outcome {
        PipelineOutcome::Finished {
            frame_count,
            zip_path,
        } => (frame_count, zip_path),
        other => panic!("expected Finished, got {other:?}"),
    };
    assert_eq!(frame_count, 10);
    assert!(Path::new(&zip_path).exists());

    let stored = h.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.status, VideoStatus::Finished);
    assert_eq!(stored.frame_count, Some(10));
    assert_eq!(stored.zip_path.as_deref(), Some(zip_path.as_str()));
    assert!(stored.error_message.is_none());

    let bundle_name = Path::new(&zip_path).file_name().unwrap().to_str().unwrap();
    assert!(bundle_name.starts_with(&format!("frames_{id}_")));
    assert!(bundle_name.ends_with(".zip"));

    let sent = h.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ana@example.com");
    assert_eq!(sent[0].subject, "Your video is ready - Framix");
    assert!(sent[0].body.contains("10 frames"));

    // Lock released, workspace cleaned
    assert!(!h.lock.is_held(id).await);
    assert_eq!(workspace_entries(&h.work_dir).await, 0);
}

#[tokio::test]
async fn test_zero_frames_marks_error() {
    let h = harness(
        Arc::new(StubExtractor { frames: 0 }),
        Arc::new(ZipArchiver::new()),
    );
    let who = uploader();
    let (id, event) = seed(&h.store, &who).await;

    let outcome = process_event(&h.ctx, &event, RetryPass::Initial).await;
    assert!(matches!(
        outcome,
        PipelineOutcome::Failed {
            failure: framix_worker::ProcessingFailure::NoFrames
        }
    ));

    let stored = h.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.status, VideoStatus::Error);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("No frames could be extracted from the video")
    );
    assert!(stored.zip_path.is_none());
    assert!(stored.frame_count.is_none());

    let sent = h.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Video processing failed - Framix");
    assert!(sent[0].body.contains("corrupt"));
}

#[tokio::test]
async fn test_extraction_failure_records_exit_code() {
    let h = harness(
        Arc::new(FailingExtractor { exit_code: 187 }),
        Arc::new(ZipArchiver::new()),
    );
    let who = uploader();
    let (id, event) = seed(&h.store, &who).await;

    let outcome = process_event(&h.ctx, &event, RetryPass::Initial).await;
    assert!(matches!(outcome, PipelineOutcome::Failed { .. }));

    let stored = h.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Frame extraction failed with exit code 187")
    );
    assert!(!h.lock.is_held(id).await);
}

#[tokio::test]
async fn test_archive_failure_marks_error_and_cleans_workspace() {
    let h = harness(Arc::new(StubExtractor { frames: 3 }), Arc::new(FailingArchiver));
    let who = uploader();
    let (id, event) = seed(&h.store, &who).await;

    let outcome = process_event(&h.ctx, &event, RetryPass::Initial).await;
    assert!(matches!(
        outcome,
        PipelineOutcome::Failed {
            failure: framix_worker::ProcessingFailure::Archive { .. }
        }
    ));

    let stored = h.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.status, VideoStatus::Error);
    assert!(stored
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("Failed to create the frame bundle:"));

    // Extracted frames do not outlive the failed attempt
    assert_eq!(workspace_entries(&h.work_dir).await, 0);

    let sent = h.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("internal error"));
}

#[tokio::test]
async fn test_duplicate_delivery_lands_already_processing() {
    let h = harness(
        Arc::new(SlowExtractor {
            inner: StubExtractor { frames: 2 },
            delay: Duration::from_millis(100),
        }),
        Arc::new(ZipArchiver::new()),
    );
    let who = uploader();
    let (id, event) = seed(&h.store, &who).await;

    let (first, second) = tokio::join!(
        process_event(&h.ctx, &event, RetryPass::Initial),
        process_event(&h.ctx, &event, RetryPass::Initial),
    );

    let outcomes = [first, second];
    let finished = outcomes
        .iter()
        .filter(|o| matches!(o, PipelineOutcome::Finished { .. }))
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o, PipelineOutcome::AlreadyProcessing))
        .count();
    assert_eq!((finished, skipped), (1, 1));

    let stored = h.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.status, VideoStatus::Finished);
    // Only the winning attempt notified
    assert_eq!(h.notifier.sent_count().await, 1);
}

#[tokio::test]
async fn test_dlq_retry_success_clears_previous_error() {
    let h = harness(
        Arc::new(StubExtractor { frames: 4 }),
        Arc::new(ZipArchiver::new()),
    );
    let who = uploader();
    let (id, event) = seed(&h.store, &who).await;

    // First attempt already failed and rests at Error
    let mut stored = h.store.find_by_id(id).await.unwrap().unwrap();
    stored.mark_error("Frame extraction failed with exit code 1");
    h.store.save(stored).await.unwrap();

    let outcome = process_event(&h.ctx, &event, RetryPass::DlqRetry).await;
    assert!(matches!(outcome, PipelineOutcome::Finished { .. }));

    let stored = h.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.status, VideoStatus::Finished);
    assert_eq!(stored.frame_count, Some(4));
    assert!(stored.error_message.is_none());
}

#[tokio::test]
async fn test_dlq_retry_failure_appends_suffix() {
    let h = harness(
        Arc::new(StubExtractor { frames: 0 }),
        Arc::new(ZipArchiver::new()),
    );
    let who = uploader();
    let (id, event) = seed(&h.store, &who).await;

    let mut stored = h.store.find_by_id(id).await.unwrap().unwrap();
    stored.mark_error("Frame extraction failed with exit code 1");
    h.store.save(stored).await.unwrap();

    let outcome = process_event(&h.ctx, &event, RetryPass::DlqRetry).await;
    assert!(matches!(outcome, PipelineOutcome::Failed { .. }));

    let stored = h.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.status, VideoStatus::Error);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("No frames could be extracted from the video after DLQ retry")
    );
}

#[tokio::test]
async fn test_status_cache_mirrors_every_persist() {
    let cache = RecordingCache::default();
    let h = harness_with_cache(
        Arc::new(StubExtractor { frames: 3 }),
        Arc::new(ZipArchiver::new()),
        Arc::new(cache.clone()),
    );
    let who = uploader();
    let (id, event) = seed(&h.store, &who).await;

    let outcome = process_event(&h.ctx, &event, RetryPass::Initial).await;
    assert!(matches!(outcome, PipelineOutcome::Finished { .. }));

    assert_eq!(
        cache.recorded().await,
        vec![(id, VideoStatus::Processing), (id, VideoStatus::Finished)]
    );
    assert_eq!(cache.get_status(id).await, Some(VideoStatus::Finished));
}

#[tokio::test]
async fn test_cache_outage_never_blocks_pipeline() {
    // Real cache client against a port nothing listens on; every mirror
    // write fails inside the cache and is absorbed there
    let cache = RedisStatusCache::new("redis://127.0.0.1:1", Duration::from_secs(60))
        .expect("cache client");
    let h = harness_with_cache(
        Arc::new(StubExtractor { frames: 2 }),
        Arc::new(ZipArchiver::new()),
        Arc::new(cache),
    );
    let who = uploader();
    let (id, event) = seed(&h.store, &who).await;

    let outcome = process_event(&h.ctx, &event, RetryPass::Initial).await;
    assert!(matches!(outcome, PipelineOutcome::Finished { .. }));

    let stored = h.store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.status, VideoStatus::Finished);
    assert_eq!(h.notifier.sent_count().await, 1);
}

#[tokio::test]
async fn test_missing_video_is_dropped() {
    let h = harness(
        Arc::new(StubExtractor { frames: 1 }),
        Arc::new(ZipArchiver::new()),
    );
    let who = uploader();
    let event = VideoEvent::video_upload(VideoId::new(), &who);

    let outcome = process_event(&h.ctx, &event, RetryPass::Initial).await;
    assert!(matches!(outcome, PipelineOutcome::VideoMissing));
    assert_eq!(h.notifier.sent_count().await, 0);
    assert!(h.store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_to_finished_flow() {
    use framix_bus::{BusConfig, EventBus};
    use framix_ingest::{RawUpload, UploadConfig, UploadCoordinator};

    let h = harness(
        Arc::new(StubExtractor { frames: 5 }),
        Arc::new(ZipArchiver::new()),
    );
    let who = uploader();

    // Offline bus: the upload still succeeds, the event is fed to the
    // pipeline by hand as a consumer would
    let bus = EventBus::new(BusConfig {
        redis_url: "redis://127.0.0.1:1".to_string(),
        ..BusConfig::default()
    })
    .expect("bus client");
    let coordinator = UploadCoordinator::new(
        Arc::new(h.store.clone()),
        Arc::new(bus),
        UploadConfig {
            upload_dir: h._root.path().join("uploads"),
        },
    );

    let video = coordinator
        .execute(RawUpload::new("clip.mp4", vec![0u8; 128]), &who)
        .await
        .expect("upload");
    assert_eq!(video.status, VideoStatus::Uploaded);

    let event = VideoEvent::video_upload(video.id, &who);
    let outcome = process_event(&h.ctx, &event, RetryPass::Initial).await;
    assert!(matches!(outcome, PipelineOutcome::Finished { frame_count: 5, .. }));

    let stored = h.store.find_by_id(video.id).await.unwrap().unwrap();
    assert_eq!(stored.status, VideoStatus::Finished);
    assert!(stored.zip_path.is_some());
}

#[tokio::test]
async fn test_store_outage_reports_unavailable_without_locking() {
    let root = tempfile::tempdir().expect("tempdir");
    let lock = InMemoryLock::default();
    let notifier = RecordingNotifier::new();
    let ctx = PipelineContext {
        config: WorkerConfig {
            work_dir: root.path().join("work"),
            output_dir: root.path().join("out"),
            ..WorkerConfig::default()
        },
        store: Arc::new(FailingStore),
        extractor: Arc::new(StubExtractor { frames: 1 }),
        archiver: Arc::new(ZipArchiver::new()),
        notifier: Arc::new(notifier.clone()),
        lock: Arc::new(lock.clone()),
        cache: Arc::new(NullCache::new()),
    };

    let who = uploader();
    let id = VideoId::new();
    let event = VideoEvent::video_upload(id, &who);

    let outcome = process_event(&ctx, &event, RetryPass::Initial).await;
    assert!(matches!(outcome, PipelineOutcome::StoreUnavailable { .. }));

    // Nothing was attempted: no lock taken, nobody notified
    assert!(!lock.is_held(id).await);
    assert_eq!(notifier.sent_count().await, 0);
}
