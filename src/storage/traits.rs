//! Storage traits and error types
//!
//! The two persisted aggregates have separate owners: [`CheckpointStore`] owns
//! crawl progress and [`RecordStore`] owns repository rows. Their writes are
//! never combined into one transaction.

use crate::state::{Checkpoint, Item};
use crate::storage::StoredItem;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable home of the single active checkpoint
pub trait CheckpointStore {
    /// Returns the active checkpoint, or `None` if no crawl is in progress
    fn load(&self) -> StorageResult<Option<Checkpoint>>;

    /// Overwrites the active checkpoint, creating it if absent
    ///
    /// The write is committed before this returns. Monotonicity of
    /// `processed_count` is the caller's concern.
    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Marks the active checkpoint inactive, keeping the row as history
    fn deactivate(&mut self) -> StorageResult<()>;

    /// All checkpoints, newest first
    fn history(&self) -> StorageResult<Vec<Checkpoint>>;
}

/// Idempotent repository persistence
pub trait RecordStore {
    /// Inserts unseen items and refreshes known ones, as one atomic batch
    ///
    /// Items are applied in order. On any failure the whole batch is rolled
    /// back. Returns the number of rows inserted or changed; re-applying a
    /// batch that is already stored returns zero.
    fn upsert(&mut self, items: &[Item]) -> StorageResult<usize>;

    /// Number of stored repositories
    fn count_items(&self) -> StorageResult<u64>;

    /// Looks up one repository by external id
    fn get_item(&self, external_id: i64) -> StorageResult<Option<StoredItem>>;

    /// Repositories with the most stars first
    fn top_items(&self, limit: usize) -> StorageResult<Vec<StoredItem>>;
}
