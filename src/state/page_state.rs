//! Claim states of a URL within one crawl run
//!
//! A URL moves `Discovered -> Claimed -> Done | Failed`. Only a `Discovered`
//! (or never-seen) URL can be claimed, and it can be claimed exactly once.

use std::fmt;

/// Represents the current state of a URL in the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    // ===== Active States =====
    /// URL is known and queued, but no task owns it yet
    Discovered,

    /// A crawl task owns the URL and is fetching or extracting it
    Claimed,

    // ===== Terminal States =====
    /// Page was fetched and its extraction output forwarded
    Done,

    /// Fetch ended in a terminal failure; not retried within this run
    Failed,
}

impl PageState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if a task may still take ownership of the URL
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Discovered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Claimed => "claimed",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
