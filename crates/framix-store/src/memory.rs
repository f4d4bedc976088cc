//! In-memory status store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use framix_models::{Video, VideoId};
use tokio::sync::RwLock;

use crate::error::StoreResult;
use crate::store::StatusStore;

/// Process-local store backed by a shared map.
///
/// Clones share the same underlying map, so a clone handed to the upload
/// side observes writes from the consumer side and vice versa.
#[derive(Clone, Default)]
pub struct InMemoryStatusStore {
    records: Arc<RwLock<HashMap<VideoId, Video>>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn find_by_id(&self, id: VideoId) -> StoreResult<Option<Video>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn save(&self, video: Video) -> StoreResult<Video> {
        self.records.write().await.insert(video.id, video.clone());
        Ok(video)
    }

    async fn list_all(&self) -> StoreResult<Vec<Video>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
