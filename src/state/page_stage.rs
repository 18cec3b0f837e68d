/// Page stage definitions for tracking crawl progress
///
/// Every URL admitted to the frontier moves through
/// `Pending → Fetching → Sanitizing → Done`, or ends early in `Failed` or
/// `Skipped`.
use std::fmt;

/// Represents the current stage of a page in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageStage {
    // ===== Active Stages =====
    /// Page is in the frontier, not yet dispatched
    Pending,

    /// Page is being validated and fetched
    Fetching,

    /// Page body is being sanitized
    Sanitizing,

    // ===== Terminal Stages =====
    /// Page was fetched and sanitized; it is part of the result
    Done,

    /// Page failed validation, fetching or sanitizing
    Failed,

    /// Page was abandoned without a verdict (deadline)
    Skipped,
}

impl PageStage {
    /// Returns true if this is a terminal stage (no further processing)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped)
    }

    /// Returns true while the page occupies a slot in the crawl
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Fetching | Self::Sanitizing)
    }

    /// Returns true if the stage machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: PageStage) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetching)
                | (Self::Fetching, Self::Sanitizing)
                | (Self::Fetching, Self::Failed)
                | (Self::Fetching, Self::Skipped)
                | (Self::Sanitizing, Self::Done)
                | (Self::Sanitizing, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Sanitizing => "sanitizing",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
