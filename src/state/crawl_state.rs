/// Crawl state definitions for the coordinator state machine
///
/// `Idle -> Running -> {Completed, PausedForQuota, Interrupted, Failed}`, with
/// `PausedForQuota -> Running` once the quota window resets.
use std::fmt;

/// Represents the state of a crawl lineage within one `run`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    /// Nothing has happened yet
    Idle,

    /// Fetching, upserting and checkpointing pages
    Running,

    /// Waiting for the remote quota window to reset
    PausedForQuota,

    // ===== Terminal States =====
    /// Source exhausted or target reached; checkpoint deactivated
    Completed,

    /// Cancelled between iterations; checkpoint left active for resume
    Interrupted,

    /// Stopped on an unrecoverable error; last saved checkpoint is the resume point
    Failed,
}

impl CrawlState {
    /// Returns true if the run has stopped in this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted | Self::Failed)
    }

    /// Returns true if a later `run` can continue the lineage
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Interrupted | Self::Failed)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        use CrawlState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Idle, Failed)
                | (Running, PausedForQuota)
                | (Running, Completed)
                | (Running, Interrupted)
                | (Running, Failed)
                | (PausedForQuota, Running)
                | (PausedForQuota, Interrupted)
                | (PausedForQuota, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::PausedForQuota => "paused_for_quota",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
