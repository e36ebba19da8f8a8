//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! repository statistics from the storage layer.

use crate::state::Checkpoint;
use crate::storage::{CheckpointStore, RecordStore, StorageResult, StoredItem};

/// Number of repositories listed by `--stats`
pub const TOP_REPOSITORIES: usize = 10;

/// Repository statistics summary
#[derive(Debug, Clone)]
pub struct RepositoryStatistics {
    /// Total number of stored repositories
    pub total_repositories: u64,

    /// Most-starred repositories, highest first
    pub top_repositories: Vec<StoredItem>,

    /// Most recent checkpoint, active or not
    pub latest_checkpoint: Option<Checkpoint>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `top_n` - How many of the most-starred repositories to include
pub fn load_statistics<S>(storage: &S, top_n: usize) -> StorageResult<RepositoryStatistics>
where
    S: CheckpointStore + RecordStore,
{
    let total_repositories = storage.count_items()?;
    let top_repositories = storage.top_items(top_n)?;
    let latest_checkpoint = storage.history()?.into_iter().next();

    Ok(RepositoryStatistics {
        total_repositories,
        top_repositories,
        latest_checkpoint,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &RepositoryStatistics) {
    println!("=== Repository Statistics ===\n");

    println!("Total repositories: {}", stats.total_repositories);
    println!();

    if !stats.top_repositories.is_empty() {
        println!("Top {} by stars:", stats.top_repositories.len());
        for (rank, stored) in stats.top_repositories.iter().enumerate() {
            let item = &stored.item;
            println!(
                "  {:>2}. {} - {} stars, {} forks, {} open issues",
                rank + 1,
                item.full_name(),
                item.stars,
                format_metric(item.forks),
                format_metric(item.open_issues)
            );
        }
        println!();
    }

    match &stats.latest_checkpoint {
        Some(checkpoint) => {
            println!("Latest checkpoint:");
            println!("  Filter: {}", checkpoint.filter);
            println!("  Processed: {}", checkpoint.processed_count);
            println!(
                "  Status: {}",
                if checkpoint.active {
                    "active (resumable)"
                } else {
                    "finished"
                }
            );
            println!(
                "  Cursor: {}",
                checkpoint.cursor.as_deref().unwrap_or("none")
            );
            if let Some(quota) = checkpoint.quota {
                println!(
                    "  Quota: {} remaining, resets at {}",
                    quota.remaining, quota.reset_at
                );
            }
            println!("  Started: {}", checkpoint.started_at);
            println!("  Last update: {}", checkpoint.last_update);
        }
        None => println!("No crawl has been recorded yet"),
    }
}

fn format_metric(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string())
}
