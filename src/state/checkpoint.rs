use crate::state::Item;
use chrono::{DateTime, Utc};

/// Remaining call budget and when it refills, as reported by the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl QuotaSnapshot {
    pub fn new(remaining: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            remaining,
            reset_at,
        }
    }

    /// A snapshot describing an exhausted quota
    pub fn exhausted(reset_at: DateTime<Utc>) -> Self {
        Self::new(0, reset_at)
    }
}

/// One page of normalized search results
///
/// Pages are transient: the coordinator consumes each one right after it is
/// fetched and only the resulting checkpoint is persisted.
#[derive(Debug, Clone)]
pub struct Page {
    /// Items in the order the remote returned them
    pub items: Vec<Item>,

    /// Continuation token, `None` once the result set is exhausted
    pub next_cursor: Option<String>,

    /// Quota as of this response
    pub quota: QuotaSnapshot,

    /// Total number of matches, when the remote reports it
    pub total_count: Option<u64>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Durable crawl progress for one lineage
///
/// Invariants kept by the coordinator:
/// - `processed_count` never decreases within a lineage
/// - `cursor` is `None` only before the first page or after the source is exhausted
/// - at most one stored checkpoint has `active == true`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Search filter this lineage was started with
    pub filter: String,

    /// Cursor of the next page to fetch
    pub cursor: Option<String>,

    /// Items upserted so far in this lineage
    pub processed_count: u64,

    /// Last quota reported by the remote
    pub quota: Option<QuotaSnapshot>,

    /// Whether this lineage may still be resumed
    pub active: bool,

    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl Checkpoint {
    /// A fresh checkpoint at the start of a lineage
    pub fn new(filter: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            filter: filter.into(),
            cursor: None,
            processed_count: 0,
            quota: None,
            active: true,
            started_at: now,
            last_update: now,
        }
    }

    /// Folds a fully upserted page into the checkpoint
    pub fn advance(&mut self, page: &Page, now: DateTime<Utc>) {
        self.processed_count += page.items.len() as u64;
        self.cursor = page.next_cursor.clone();
        self.quota = Some(page.quota);
        self.last_update = now;
    }
}
