//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Item`: a normalized repository record, keyed by its external id
//! - `Page`: one transient page of search results with its cursor and quota
//! - `QuotaSnapshot`: remaining calls and reset instant reported by the remote
//! - `Checkpoint`: durable resume point of a crawl lineage
//! - `CrawlState`: coordinator state machine

mod checkpoint;
mod crawl_state;
mod item;

// Re-export main types
pub use checkpoint::{Checkpoint, Page, QuotaSnapshot};
pub use crawl_state::CrawlState;
pub use item::{Item, ItemError};
