//! Crawler module for paging through the remote search API
//!
//! This module contains the core crawling logic, including:
//! - Quota tracking and pause decisions
//! - Retry with exponential back-off on transient failures
//! - Page fetching over the GitHub GraphQL API
//! - Overall crawl coordination and checkpointing

mod clock;
mod coordinator;
mod fetcher;
mod github;
mod rate_limiter;
mod retry;

#[cfg(test)]
mod testing;

pub use clock::{Clock, SystemClock};
#[cfg(test)]
pub use clock::ManualClock;
pub use coordinator::{run_crawl, Coordinator, Summary};
pub use fetcher::{short_cursor, FetchError, PageFetcher, PageSource};
pub use github::{build_http_client, GithubClient, SEARCH_QUERY};
pub use rate_limiter::RateLimiter;
pub use retry::{Classify, ErrorClass, RetryError, RetryPolicy};

use crate::config::Config;
use tokio::sync::watch;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the database and bootstrap its schema
/// 2. Load the active checkpoint when `resume` is set
/// 3. Build the authenticated GitHub client
/// 4. Page through the search results, upserting and checkpointing each page
///
/// Failures inside the loop are reported in the returned [`Summary`]; only
/// setup errors (database, missing token) come back as `Err`.
pub async fn crawl(
    config: &Config,
    resume: bool,
    cancel: Option<watch::Receiver<bool>>,
) -> crate::Result<Summary> {
    run_crawl(config, resume, cancel).await
}
