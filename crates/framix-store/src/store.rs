//! The status store contract.

use async_trait::async_trait;
use framix_models::{Video, VideoId};

use crate::error::StoreResult;

/// Persistence contract for video records.
///
/// No optimistic versioning: concurrent writers have last-write-wins
/// semantics, which the pipeline accepts for the main-vs-DLQ consumer race.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Look up a video by id. `Ok(None)` means the record does not exist,
    /// which consumers treat differently from the store being unreachable.
    async fn find_by_id(&self, id: VideoId) -> StoreResult<Option<Video>>;

    /// Persist a record, inserting or replacing. Returns the stored value.
    async fn save(&self, video: Video) -> StoreResult<Video>;

    /// List every known record.
    async fn list_all(&self) -> StoreResult<Vec<Video>>;
}
