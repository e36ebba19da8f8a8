//! Scripted page source for unit tests

use crate::crawler::{FetchError, PageSource};
use crate::state::{Item, Page, QuotaSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One recorded call to [`ScriptedSource::query`]
#[derive(Debug, Clone)]
pub struct SourceCall {
    pub filter: String,
    pub cursor: Option<String>,
    pub page_size: u32,
}

/// Replays canned responses in order and records every request
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Result<Page, FetchError>>>,
    fallback: Option<FetchError>,
    calls: Mutex<Vec<SourceCall>>,
}

impl ScriptedSource {
    pub fn new(responses: Vec<Result<Page, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A source that fails every call with `err`
    pub fn failing(err: FetchError) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(err),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requested_cursors(&self) -> Vec<Option<String>> {
        self.calls().into_iter().map(|c| c.cursor).collect()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn query(
        &self,
        filter: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page, FetchError> {
        self.calls.lock().unwrap().push(SourceCall {
            filter: filter.to_string(),
            cursor: cursor.map(String::from),
            page_size,
        });

        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Err(self
                .fallback
                .clone()
                .unwrap_or_else(|| FetchError::Query("script exhausted".to_string()))),
        }
    }
}

/// A page of valid items with a healthy quota
pub fn page(ids: &[i64], next_cursor: Option<&str>, now: DateTime<Utc>) -> Page {
    page_with_quota(
        ids,
        next_cursor,
        QuotaSnapshot::new(5000, now + Duration::hours(1)),
        now,
    )
}

pub fn page_with_quota(
    ids: &[i64],
    next_cursor: Option<&str>,
    quota: QuotaSnapshot,
    now: DateTime<Utc>,
) -> Page {
    Page {
        items: ids
            .iter()
            .map(|id| {
                Item::new(*id, format!("repo-{}", id), format!("owner-{}", id), 100 + id, now)
                    .unwrap()
            })
            .collect(),
        next_cursor: next_cursor.map(String::from),
        quota,
        total_count: None,
    }
}
