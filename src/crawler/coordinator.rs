//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates:
//! - Loading or starting a checkpoint lineage
//! - Pausing before requests when the quota runs low
//! - Fetching pages, upserting records and saving checkpoints, strictly in that order
//! - Waiting out quota exhaustion without losing the cursor
//! - Handling cancellation between iterations

use crate::config::{Config, RateLimitConfig, RetryConfig};
use crate::crawler::fetcher::short_cursor;
use crate::crawler::{
    Clock, FetchError, GithubClient, PageFetcher, PageSource, RateLimiter, RetryPolicy,
    SystemClock,
};
use crate::state::{Checkpoint, CrawlState, QuotaSnapshot};
use crate::storage::{CheckpointStore, RecordStore, SqliteStorage};
use crate::CrawlError;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Shortest wait after a quota-exceeded response whose reset instant has passed
const MIN_QUOTA_WAIT: Duration = Duration::from_secs(1);

/// Outcome of one [`Coordinator::run`]
#[derive(Debug)]
pub struct Summary {
    /// Items processed in this lineage, including earlier resumed runs
    pub processed_count: u64,
    pub final_state: CrawlState,

    /// Cause of a `Failed` run
    pub last_error: Option<CrawlError>,

    /// Pages fetched by this run
    pub pages_fetched: u64,

    /// Rows inserted or changed by this run
    pub rows_written: u64,

    /// Times this run waited for the quota window to reset
    pub quota_pauses: u64,
}

/// Main crawler coordinator structure
///
/// Single-writer: concurrent coordinators over the same storage are not supported.
pub struct Coordinator<P, S, C = SystemClock> {
    fetcher: PageFetcher<P>,
    storage: S,
    limiter: RateLimiter,
    clock: C,
    page_size: u32,
    cancel: Option<watch::Receiver<bool>>,
    state: CrawlState,
    transitions: Vec<CrawlState>,
}

impl<P, S, C> Coordinator<P, S, C>
where
    P: PageSource,
    S: CheckpointStore + RecordStore,
    C: Clock,
{
    pub fn new(
        source: P,
        storage: S,
        clock: C,
        retry: &RetryConfig,
        rate_limit: &RateLimitConfig,
    ) -> Self {
        Self {
            fetcher: PageFetcher::new(source, RetryPolicy::new(retry)),
            storage,
            limiter: RateLimiter::new(rate_limit),
            clock,
            page_size: crate::config::MAX_PAGE_SIZE,
            cancel: None,
            state: CrawlState::Idle,
            transitions: Vec::new(),
        }
    }

    /// Creates a coordinator using the retry, rate-limit and page-size settings of `config`
    pub fn from_config(source: P, storage: S, clock: C, config: &Config) -> Self {
        Self::new(source, storage, clock, &config.retry, &config.rate_limit)
            .with_page_size(config.crawler.page_size)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Stops the crawl between iterations once `cancel` reads `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Runs the crawl loop until the source is exhausted, `target` items have
    /// been processed, the run is cancelled, or an unrecoverable error occurs
    ///
    /// With `resume`, the active checkpoint is continued; its filter must equal
    /// `filter`. Without it, the crawl starts from the first page and its first
    /// save overwrites any active checkpoint.
    pub async fn run(&mut self, target: u64, filter: &str, resume: bool) -> Summary {
        self.state = CrawlState::Idle;
        self.transitions = vec![CrawlState::Idle];

        let mut summary = Summary {
            processed_count: 0,
            final_state: CrawlState::Idle,
            last_error: None,
            pages_fetched: 0,
            rows_written: 0,
            quota_pauses: 0,
        };

        let mut checkpoint = match self.starting_checkpoint(filter, resume) {
            Ok(checkpoint) => checkpoint,
            Err(e) => return self.fail(summary, e),
        };
        summary.processed_count = checkpoint.processed_count;

        if let Some(quota) = checkpoint.quota {
            self.limiter.observe(quota);
        }

        self.transition(CrawlState::Running);
        let start_time = Instant::now();

        if checkpoint.processed_count >= target {
            tracing::info!(
                "Checkpoint already holds {} items (target {})",
                checkpoint.processed_count,
                target
            );
            return self.complete(summary);
        }

        loop {
            if self.is_cancelled() {
                tracing::info!("Cancellation requested, stopping crawl");
                self.transition(CrawlState::Interrupted);
                summary.final_state = self.state;
                return summary;
            }

            let wait = self.limiter.should_pause(self.clock.now());
            if !wait.is_zero() {
                tracing::warn!(
                    "Rate limit low. Waiting {:.0} seconds until reset...",
                    wait.as_secs_f64()
                );
                self.pause(wait).await;
                continue;
            }

            let page = match self
                .fetcher
                .fetch_page(
                    &self.clock,
                    checkpoint.cursor.as_deref(),
                    self.page_size,
                    filter,
                )
                .await
            {
                Ok(page) => page,
                Err(FetchError::QuotaExceeded { reset_at }) => {
                    summary.quota_pauses += 1;
                    self.transition(CrawlState::PausedForQuota);

                    // Cursor and count stay put; only the quota snapshot changes
                    let exhausted = QuotaSnapshot::exhausted(reset_at);
                    checkpoint.quota = Some(exhausted);
                    checkpoint.last_update = self.clock.now();
                    if let Err(e) = self.storage.save(&checkpoint) {
                        return self.fail(summary, e.into());
                    }

                    self.limiter.observe(exhausted);
                    let wait = self
                        .limiter
                        .time_until_reset(reset_at, self.clock.now())
                        .max(MIN_QUOTA_WAIT);
                    tracing::warn!(
                        "Quota exceeded. Waiting {:.0} seconds until {}...",
                        wait.as_secs_f64(),
                        reset_at
                    );

                    if self.pause(wait).await {
                        tracing::info!("Cancellation requested during quota pause");
                        self.transition(CrawlState::Interrupted);
                        summary.final_state = self.state;
                        return summary;
                    }

                    self.transition(CrawlState::Running);
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        "Fetch failed at cursor {}: {}",
                        checkpoint.cursor.as_deref().map(short_cursor).unwrap_or("None"),
                        e
                    );
                    return self.fail(summary, e.into());
                }
            };

            summary.pages_fetched += 1;
            self.limiter.observe(page.quota);

            if summary.pages_fetched == 1 {
                if let Some(total) = page.total_count {
                    tracing::info!("Total repositories matching query: {}", total);
                }
            }

            let written = match self.storage.upsert(&page.items) {
                Ok(written) => written,
                Err(e) => {
                    tracing::error!("Upsert of {} items failed: {}", page.items.len(), e);
                    return self.fail(summary, e.into());
                }
            };
            summary.rows_written += written as u64;

            checkpoint.advance(&page, self.clock.now());
            if let Err(e) = self.storage.save(&checkpoint) {
                tracing::error!("Checkpoint save failed: {}", e);
                return self.fail(summary, e.into());
            }
            summary.processed_count = checkpoint.processed_count;

            let elapsed = start_time.elapsed().as_secs_f64();
            tracing::info!(
                "Progress: {}/{} ({:.1}%), {} rows written, {:.2} pages/sec",
                checkpoint.processed_count,
                target,
                checkpoint.processed_count as f64 * 100.0 / target as f64,
                summary.rows_written,
                if elapsed > 0.0 {
                    summary.pages_fetched as f64 / elapsed
                } else {
                    0.0
                }
            );

            if page.is_last() {
                tracing::info!("No more pages available");
                return self.complete(summary);
            }

            if checkpoint.processed_count >= target {
                tracing::info!("Reached target of {} repositories", target);
                return self.complete(summary);
            }
        }
    }

    fn starting_checkpoint(&self, filter: &str, resume: bool) -> Result<Checkpoint, CrawlError> {
        let now = self.clock.now();

        if !resume {
            tracing::info!("Starting fresh crawl with filter '{}'", filter);
            return Ok(Checkpoint::new(filter, now));
        }

        match self.storage.load()? {
            Some(stored) if stored.filter != filter => Err(CrawlError::FilterMismatch {
                stored: stored.filter,
                requested: filter.to_string(),
            }),
            Some(stored) => {
                tracing::info!(
                    "Resuming from checkpoint: {} processed, cursor {}",
                    stored.processed_count,
                    stored.cursor.as_deref().map(short_cursor).unwrap_or("None")
                );
                Ok(stored)
            }
            None => {
                tracing::info!("No active checkpoint found, starting new crawl");
                Ok(Checkpoint::new(filter, now))
            }
        }
    }

    fn complete(&mut self, mut summary: Summary) -> Summary {
        if let Err(e) = self.storage.deactivate() {
            return self.fail(summary, e.into());
        }
        self.transition(CrawlState::Completed);
        tracing::info!(
            "Crawl complete: {} repositories processed",
            summary.processed_count
        );
        summary.final_state = self.state;
        summary
    }

    fn fail(&mut self, mut summary: Summary, error: CrawlError) -> Summary {
        self.transition(CrawlState::Failed);
        tracing::error!("Crawl failed: {}", error);
        summary.final_state = self.state;
        summary.last_error = Some(error);
        summary
    }

    fn transition(&mut self, next: CrawlState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!("Unexpected state transition {} -> {}", self.state, next);
        }
        tracing::debug!("State: {} -> {}", self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Sleeps for `wait`; returns true if cancellation arrived first
    async fn pause(&mut self, wait: Duration) -> bool {
        let Some(rx) = self.cancel.as_mut() else {
            self.clock.sleep(wait).await;
            return false;
        };

        if *rx.borrow() {
            return true;
        }

        let cancelled = async {
            loop {
                if rx.changed().await.is_err() {
                    // Sender gone: nobody can cancel anymore
                    std::future::pending::<()>().await;
                }
                if *rx.borrow() {
                    break;
                }
            }
        };

        tokio::select! {
            _ = self.clock.sleep(wait) => false,
            _ = cancelled => true,
        }
    }

    /// Every state entered by the last `run`, starting with `Idle`
    pub fn transitions(&self) -> &[CrawlState] {
        &self.transitions
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn fetcher(&self) -> &PageFetcher<P> {
        &self.fetcher
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

/// Runs a complete crawl against GitHub with the given configuration
///
/// Opens the database at `config.output.database_path`, reads the API token
/// from the environment and crawls `config.crawler.query` up to
/// `config.crawler.target_count` items.
pub async fn run_crawl(
    config: &Config,
    resume: bool,
    cancel: Option<watch::Receiver<bool>>,
) -> Result<Summary, CrawlError> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let client = GithubClient::from_env(&config.api)?;

    let mut coordinator = Coordinator::from_config(client, storage, SystemClock, config);
    if let Some(cancel) = cancel {
        coordinator = coordinator.with_cancellation(cancel);
    }

    Ok(coordinator
        .run(config.crawler.target_count, &config.crawler.query, resume)
        .await)
}
