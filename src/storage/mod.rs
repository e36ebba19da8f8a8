//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema bootstrap
//! - Idempotent repository upserts
//! - Checkpoint persistence and resumption support

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{CheckpointStore, RecordStore, StorageError, StorageResult};

use crate::state::Item;
use chrono::{DateTime, Utc};

/// A repository row as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub item: Item,

    /// When the repository was first upserted; never changes afterwards
    pub first_seen_at: DateTime<Utc>,
}
