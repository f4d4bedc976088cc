//! Best-effort status cache.
//!
//! Mirrors the persisted status into Redis for cheap polling. Strictly
//! best-effort: a cache failure is logged and swallowed, never surfaced to
//! the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;

use framix_models::{VideoId, VideoStatus};

use crate::error::BusResult;

fn status_key(id: VideoId) -> String {
    format!("video:status:{id}")
}

fn parse_status(s: &str) -> Option<VideoStatus> {
    match s {
        "UPLOADED" => Some(VideoStatus::Uploaded),
        "PROCESSING" => Some(VideoStatus::Processing),
        "FINISHED" => Some(VideoStatus::Finished),
        "ERROR" => Some(VideoStatus::Error),
        _ => None,
    }
}

/// Mirror of the persisted video status.
#[async_trait]
pub trait StatusCache: Send + Sync {
    /// Record the current status. Failures are absorbed.
    async fn put_status(&self, id: VideoId, status: VideoStatus);

    /// Last cached status, if present and still within TTL.
    async fn get_status(&self, id: VideoId) -> Option<VideoStatus>;
}

/// [`StatusCache`] on Redis string keys with TTL.
pub struct RedisStatusCache {
    client: redis::Client,
    ttl: Duration,
}

impl RedisStatusCache {
    pub fn new(redis_url: &str, ttl: Duration) -> BusResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client, ttl })
    }

    /// Create from environment variables (`REDIS_URL`, `STATUS_CACHE_TTL_SECS`).
    pub fn from_env() -> BusResult<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let ttl = Duration::from_secs(
            std::env::var("STATUS_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1800), // 30 minutes
        );
        Self::new(&redis_url, ttl)
    }
}

#[async_trait]
impl StatusCache for RedisStatusCache {
    async fn put_status(&self, id: VideoId, status: VideoStatus) {
        let key = status_key(id);
        let ttl_secs = self.ttl.as_secs();

        let attempt = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.set_ex::<_, _, ()>(&key, status.as_str(), ttl_secs).await?;
            Ok::<_, redis::RedisError>(())
        };

        if let Err(e) = attempt.await {
            warn!(video_id = %id, status = %status, "Status cache write failed: {e}");
        }
    }

    async fn get_status(&self, id: VideoId) -> Option<VideoStatus> {
        let key = status_key(id);

        let attempt = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let value: Option<String> = conn.get(&key).await?;
            Ok::<_, redis::RedisError>(value)
        };

        match attempt.await {
            Ok(value) => value.as_deref().and_then(parse_status),
            Err(e) => {
                warn!(video_id = %id, "Status cache read failed: {e}");
                None
            }
        }
    }
}

/// No-op [`StatusCache`] for deployments without Redis caching.
#[derive(Debug, Clone, Default)]
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StatusCache for NullCache {
    async fn put_status(&self, _id: VideoId, _status: VideoStatus) {}

    async fn get_status(&self, _id: VideoId) -> Option<VideoStatus> {
        None
    }
}
