//! Page fetching over the remote paged source
//!
//! This module handles:
//! - The [`PageSource`] seam: one query against the remote search API
//! - Error classification for the retry layer
//! - [`PageFetcher`]: one page per call, guarded by [`RetryPolicy`]

use crate::config::MAX_PAGE_SIZE;
use crate::crawler::retry::{Classify, ErrorClass, RetryError, RetryPolicy};
use crate::crawler::Clock;
use crate::state::Page;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while fetching a page
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    // ===== Transient =====
    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    #[error("Rate limited by remote (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    // ===== Flow control =====
    #[error("Quota exceeded until {reset_at}")]
    QuotaExceeded { reset_at: DateTime<Utc> },

    // ===== Permanent =====
    #[error("Authentication failed: HTTP {status}")]
    Unauthorized { status: u16 },

    #[error("Request rejected: HTTP {status}: {message}")]
    Client { status: u16, message: String },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("No API token found in environment variable {0}")]
    MissingToken(String),

    // ===== Terminal =====
    #[error("Gave up after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

impl Classify for FetchError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::Server { .. } | Self::RateLimited { .. } => {
                ErrorClass::Transient
            }
            // Quota exhaustion is handled by the coordinator with a timed wait
            _ => ErrorClass::Permanent,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<RetryError<FetchError>> for FetchError {
    fn from(err: RetryError<FetchError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => Self::RetryExhausted {
                attempts,
                last: Box::new(last),
            },
            RetryError::Rejected(e) => e,
        }
    }
}

/// The remote paged search API
///
/// One call is one network request: `filter` selects the dataset, `cursor` is
/// the continuation token of the previous page (`None` for the first page).
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn query(
        &self,
        filter: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page, FetchError>;
}

/// Fetches one page at a time with retry on transient failures
pub struct PageFetcher<S> {
    source: S,
    retry: RetryPolicy,
}

impl<S: PageSource> PageFetcher<S> {
    pub fn new(source: S, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// Fetches the page after `cursor`
    ///
    /// `page_size` is clamped to `1..=MAX_PAGE_SIZE`. Permanent errors and
    /// `QuotaExceeded` come back unchanged; running out of attempts yields
    /// `FetchError::RetryExhausted`.
    pub async fn fetch_page<C: Clock + ?Sized>(
        &self,
        clock: &C,
        cursor: Option<&str>,
        page_size: u32,
        filter: &str,
    ) -> Result<Page, FetchError> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        tracing::debug!(
            "Fetching page (cursor: {}, size: {})",
            cursor.map(short_cursor).unwrap_or("None"),
            page_size
        );

        let source = &self.source;
        let page = self
            .retry
            .execute(clock, move || source.query(filter, cursor, page_size))
            .await?;

        Ok(page)
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

/// First 20 characters of a cursor, for log lines
pub fn short_cursor(cursor: &str) -> &str {
    match cursor.char_indices().nth(20) {
        Some((idx, _)) => &cursor[..idx],
        None => cursor,
    }
}
