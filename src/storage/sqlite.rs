//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::state::{Checkpoint, Item, QuotaSnapshot};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CheckpointStore, RecordStore, StorageError, StorageResult};
use crate::storage::StoredItem;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;

const UPSERT_SQL: &str = "
    INSERT INTO repositories
        (external_id, name, owner, stars, forks, open_issues, observed_at, first_seen_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
    ON CONFLICT(external_id) DO UPDATE SET
        name = excluded.name,
        owner = excluded.owner,
        stars = excluded.stars,
        forks = excluded.forks,
        open_issues = excluded.open_issues,
        observed_at = excluded.observed_at
    WHERE excluded.observed_at >= observed_at
      AND (name IS NOT excluded.name
        OR owner IS NOT excluded.owner
        OR stars IS NOT excluded.stars
        OR forks IS NOT excluded.forks
        OR open_issues IS NOT excluded.open_issues
        OR observed_at IS NOT excluded.observed_at)";

const ITEM_COLUMNS: &str =
    "external_id, name, owner, stars, forks, open_issues, observed_at, first_seen_at";

const CHECKPOINT_COLUMNS: &str = "filter, cursor, processed_count, quota_remaining, \
     quota_reset_at, active, started_at, last_update";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // FULL sync: a committed checkpoint must survive power loss, not just a crash
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl CheckpointStore for SqliteStorage {
    fn load(&self) -> StorageResult<Option<Checkpoint>> {
        let sql = format!(
            "SELECT {} FROM checkpoints WHERE active = 1 ORDER BY id DESC LIMIT 1",
            CHECKPOINT_COLUMNS
        );
        let raw = self.conn.query_row(&sql, [], RawCheckpoint::from_row).optional()?;
        raw.map(RawCheckpoint::into_checkpoint).transpose()
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        let processed_count = checkpoint.processed_count as i64;
        let quota_remaining = checkpoint.quota.map(|q| q.remaining);
        let quota_reset_at = checkpoint.quota.map(|q| format_timestamp(&q.reset_at));
        let started_at = format_timestamp(&checkpoint.started_at);
        let last_update = format_timestamp(&checkpoint.last_update);
        let values = params![
            checkpoint.filter,
            checkpoint.cursor,
            processed_count,
            quota_remaining,
            quota_reset_at,
            checkpoint.active,
            started_at,
            last_update,
        ];

        let updated = tx
            .execute(
                "UPDATE checkpoints SET filter = ?1, cursor = ?2, processed_count = ?3,
                 quota_remaining = ?4, quota_reset_at = ?5, active = ?6,
                 started_at = ?7, last_update = ?8
                 WHERE active = 1",
                values,
            )
            .map_err(classify_error)?;

        if updated == 0 {
            tx.execute(
                &format!(
                    "INSERT INTO checkpoints ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    CHECKPOINT_COLUMNS
                ),
                values,
            )
            .map_err(classify_error)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn deactivate(&mut self) -> StorageResult<()> {
        let now = format_timestamp(&Utc::now());
        self.conn.execute(
            "UPDATE checkpoints SET active = 0, last_update = ?1 WHERE active = 1",
            params![now],
        )?;
        Ok(())
    }

    fn history(&self) -> StorageResult<Vec<Checkpoint>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM checkpoints ORDER BY id DESC",
            CHECKPOINT_COLUMNS
        ))?;

        let raws = stmt
            .query_map([], RawCheckpoint::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(RawCheckpoint::into_checkpoint).collect()
    }
}

impl RecordStore for SqliteStorage {
    fn upsert(&mut self, items: &[Item]) -> StorageResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut affected = 0;

        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            for item in items {
                affected += stmt
                    .execute(params![
                        item.external_id,
                        item.name,
                        item.owner,
                        item.stars,
                        item.forks,
                        item.open_issues,
                        format_timestamp(&item.observed_at),
                    ])
                    .map_err(classify_error)?;
            }
        }

        // Dropping the transaction on an early return rolls back the whole batch
        tx.commit()?;
        Ok(affected)
    }

    fn count_items(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM repositories", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn get_item(&self, external_id: i64) -> StorageResult<Option<StoredItem>> {
        let sql = format!(
            "SELECT {} FROM repositories WHERE external_id = ?1",
            ITEM_COLUMNS
        );
        let raw = self
            .conn
            .query_row(&sql, params![external_id], RawItem::from_row)
            .optional()?;
        raw.map(RawItem::into_stored).transpose()
    }

    fn top_items(&self, limit: usize) -> StorageResult<Vec<StoredItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM repositories ORDER BY stars DESC, external_id ASC LIMIT ?1",
            ITEM_COLUMNS
        ))?;

        let raws = stmt
            .query_map(params![limit as i64], RawItem::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(RawItem::into_stored).collect()
    }
}

/// Checkpoint columns before timestamp parsing
struct RawCheckpoint {
    filter: String,
    cursor: Option<String>,
    processed_count: i64,
    quota_remaining: Option<u32>,
    quota_reset_at: Option<String>,
    active: bool,
    started_at: String,
    last_update: String,
}

impl RawCheckpoint {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            filter: row.get(0)?,
            cursor: row.get(1)?,
            processed_count: row.get(2)?,
            quota_remaining: row.get(3)?,
            quota_reset_at: row.get(4)?,
            active: row.get(5)?,
            started_at: row.get(6)?,
            last_update: row.get(7)?,
        })
    }

    fn into_checkpoint(self) -> StorageResult<Checkpoint> {
        let quota = match (self.quota_remaining, self.quota_reset_at) {
            (Some(remaining), Some(reset_at)) => {
                Some(QuotaSnapshot::new(remaining, parse_timestamp(&reset_at)?))
            }
            _ => None,
        };

        Ok(Checkpoint {
            filter: self.filter,
            cursor: self.cursor,
            processed_count: self.processed_count.max(0) as u64,
            quota,
            active: self.active,
            started_at: parse_timestamp(&self.started_at)?,
            last_update: parse_timestamp(&self.last_update)?,
        })
    }
}

/// Repository columns before timestamp parsing
struct RawItem {
    external_id: i64,
    name: String,
    owner: String,
    stars: i64,
    forks: Option<i64>,
    open_issues: Option<i64>,
    observed_at: String,
    first_seen_at: String,
}

impl RawItem {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            external_id: row.get(0)?,
            name: row.get(1)?,
            owner: row.get(2)?,
            stars: row.get(3)?,
            forks: row.get(4)?,
            open_issues: row.get(5)?,
            observed_at: row.get(6)?,
            first_seen_at: row.get(7)?,
        })
    }

    fn into_stored(self) -> StorageResult<StoredItem> {
        Ok(StoredItem {
            item: Item {
                external_id: self.external_id,
                name: self.name,
                owner: self.owner,
                stars: self.stars,
                forks: self.forks,
                open_issues: self.open_issues,
                observed_at: parse_timestamp(&self.observed_at)?,
            },
            first_seen_at: parse_timestamp(&self.first_seen_at)?,
        })
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort as text
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("invalid timestamp '{}': {}", s, e)))
}

fn classify_error(err: rusqlite::Error) -> StorageError {
    if let rusqlite::Error::SqliteFailure(code, message) = &err {
        if code.code == ErrorCode::ConstraintViolation {
            return StorageError::ConstraintViolation(
                message.clone().unwrap_or_else(|| code.to_string()),
            );
        }
    }
    StorageError::Sqlite(err)
}
