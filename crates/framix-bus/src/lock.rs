//! Per-video distributed lock.
//!
//! The lock is the only thing standing between two workers and the same
//! video: acquisition is non-blocking, TTL-bounded against crashed holders,
//! and deliberately fail-open when the backend itself is unreachable (a
//! documented availability-over-exclusivity trade, switchable via config).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use framix_models::VideoId;

use crate::error::BusResult;

/// Lock configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Redis URL
    pub redis_url: String,
    /// Lock time-to-live; bounds the damage from a crashed holder
    pub ttl: Duration,
    /// Treat a backend failure as acquired (availability) instead of
    /// held (strictness)
    pub fail_open: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            ttl: Duration::from_secs(600), // 10 minutes
            fail_open: true,
        }
    }
}

impl LockConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            ttl: Duration::from_secs(
                std::env::var("LOCK_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            fail_open: std::env::var("LOCK_FAIL_OPEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fail_open),
        }
    }
}

/// Cross-process exclusive lock, keyed per video.
///
/// Methods return plain booleans: the backend-failure policy lives inside
/// the implementation, callers only see acquired-or-not.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take the lock. `false` means another holder is active.
    async fn acquire(&self, id: VideoId) -> bool;

    /// Drop the lock. `true` if an entry was actually removed.
    async fn release(&self, id: VideoId) -> bool;

    /// Probe whether any holder currently has the lock.
    async fn is_held(&self, id: VideoId) -> bool;
}

fn lock_key(id: VideoId) -> String {
    format!("lock:video:{id}")
}

/// [`DistributedLock`] on Redis `SET NX PX`.
pub struct RedisLock {
    client: redis::Client,
    config: LockConfig,
    /// Opaque holder marker written as the lock value, for debugging
    holder: String,
}

impl RedisLock {
    pub fn new(config: LockConfig) -> BusResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            holder: format!("holder-{}", Uuid::new_v4()),
        })
    }

    pub fn from_env() -> BusResult<Self> {
        Self::new(LockConfig::from_env())
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn acquire(&self, id: VideoId) -> bool {
        let key = lock_key(id);
        let ttl_ms = self.config.ttl.as_millis() as u64;

        let attempt = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let reply: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&self.holder)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await?;
            Ok::<_, redis::RedisError>(reply.is_some())
        };

        match attempt.await {
            Ok(acquired) => {
                debug!(video_id = %id, acquired, "Lock acquisition attempt");
                acquired
            }
            Err(e) if self.config.fail_open => {
                warn!(video_id = %id, "Lock backend unreachable, failing open: {e}");
                true
            }
            Err(e) => {
                warn!(video_id = %id, "Lock backend unreachable, failing closed: {e}");
                false
            }
        }
    }

    async fn release(&self, id: VideoId) -> bool {
        let key = lock_key(id);

        let attempt = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let removed: i64 = conn.del(&key).await?;
            Ok::<_, redis::RedisError>(removed > 0)
        };

        match attempt.await {
            Ok(removed) => removed,
            Err(e) => {
                // TTL expiry is the backstop when release cannot reach Redis
                warn!(video_id = %id, "Lock release failed: {e}");
                false
            }
        }
    }

    async fn is_held(&self, id: VideoId) -> bool {
        let key = lock_key(id);

        let attempt = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let exists: bool = conn.exists(&key).await?;
            Ok::<_, redis::RedisError>(exists)
        };

        attempt.await.unwrap_or(false)
    }
}

/// Process-local [`DistributedLock`] with real TTL expiry.
///
/// Backs tests and single-process deployments; clones share state.
#[derive(Clone)]
pub struct InMemoryLock {
    entries: std::sync::Arc<Mutex<HashMap<VideoId, Instant>>>,
    ttl: Duration,
}

impl InMemoryLock {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: std::sync::Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn acquire(&self, id: VideoId) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, acquired_at| now.duration_since(*acquired_at) < self.ttl);

        if entries.contains_key(&id) {
            false
        } else {
            entries.insert(id, now);
            true
        }
    }

    async fn release(&self, id: VideoId) -> bool {
        self.entries.lock().await.remove(&id).is_some()
    }

    async fn is_held(&self, id: VideoId) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, acquired_at| now.duration_since(*acquired_at) < self.ttl);
        entries.contains_key(&id)
    }
}
