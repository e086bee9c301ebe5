use async_trait::async_trait;
use thiserror::Error;

use crate::core::model::{MirrorRecord, NewMirrorRecord};

/// Error type for mirror operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MirrorError {
    /// Error reported by the backing store
    #[error("storage error: {0}")]
    Storage(String),

    /// Error when opening the store with unusable settings
    #[error("invalid mirror configuration: {0}")]
    InvalidConfig(String),

    #[error("mirror is closed")]
    Closed,
}

/// Result type for mirror operations
pub type MirrorResult<T> = Result<T, MirrorError>;

/// MessageMirror defines the port for the best-effort local copy of published
/// messages.
#[async_trait]
pub trait MessageMirror: Send + Sync + 'static {
    /// Append a record. The mirror assigns the id and stamps the current
    /// wall-clock time.
    async fn save(&self, record: NewMirrorRecord) -> MirrorResult<()>;

    /// Records of `topic`, newest first.
    async fn query_by_topic(
        &self,
        topic: &str,
        limit: u32,
        offset: u64,
    ) -> MirrorResult<Vec<MirrorRecord>>;

    /// Total number of stored records across all topics.
    async fn count(&self) -> MirrorResult<u64>;

    /// Number of stored records of `topic`.
    async fn count_by_topic(&self, topic: &str) -> MirrorResult<u64>;

    async fn close(&self) -> MirrorResult<()>;
}
