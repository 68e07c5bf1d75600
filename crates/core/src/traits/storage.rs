//! Storage ports

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ProgressRecord;

/// Client-local key-value storage (best effort, survives normal restarts)
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Durable per-book progress owned by the storage collaborator
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Fetch the stored record, `None` if the book has no progress yet
    async fn fetch(&self, book_id: &str) -> Result<Option<ProgressRecord>>;

    /// Write position and percentage
    async fn update_progress(
        &self,
        book_id: &str,
        last_position: usize,
        progress_percent: u8,
    ) -> Result<()>;
}
