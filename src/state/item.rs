//! Normalized repository record

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reasons a search result cannot become an [`Item`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    #[error("external id must be positive, got {0}")]
    InvalidId(i64),

    #[error("star count cannot be negative, got {0}")]
    NegativeStars(i64),

    #[error("name and owner are required")]
    MissingName,
}

/// A crawled repository
///
/// `external_id` is the upsert key: it never changes for a repository and no
/// two stored rows share it. Everything else is refreshed on each observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// GitHub `databaseId`
    pub external_id: i64,

    /// Repository name
    pub name: String,

    /// Owner login (user or organization)
    pub owner: String,

    /// Stargazer count
    pub stars: i64,

    /// Fork count, when reported
    pub forks: Option<i64>,

    /// Open issue count, when reported
    pub open_issues: Option<i64>,

    /// When this snapshot of the metrics was taken
    pub observed_at: DateTime<Utc>,
}

impl Item {
    /// Builds a validated item
    pub fn new(
        external_id: i64,
        name: impl Into<String>,
        owner: impl Into<String>,
        stars: i64,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, ItemError> {
        let name = name.into();
        let owner = owner.into();

        if external_id <= 0 {
            return Err(ItemError::InvalidId(external_id));
        }
        if stars < 0 {
            return Err(ItemError::NegativeStars(stars));
        }
        if name.is_empty() || owner.is_empty() {
            return Err(ItemError::MissingName);
        }

        Ok(Self {
            external_id,
            name,
            owner,
            stars,
            forks: None,
            open_issues: None,
            observed_at,
        })
    }

    pub fn with_forks(mut self, forks: Option<i64>) -> Self {
        self.forks = forks;
        self
    }

    pub fn with_open_issues(mut self, open_issues: Option<i64>) -> Self {
        self.open_issues = open_issues;
        self
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}
