//! Core types for media-dl

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata record for one media item in a batch
///
/// Produced by a [`MediaFetchService`](crate::fetch::MediaFetchService) and never
/// mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Origin-unique identifier (absent for some collection entries)
    pub id: Option<String>,
    /// Item title as reported by the origin
    #[serde(default)]
    pub title: String,
    /// Duration in seconds as reported by the origin (may be fractional)
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// Upload date, if known
    #[serde(default)]
    pub upload_date: Option<NaiveDate>,
    /// URL the item is acquired from
    pub url: String,
}

impl ItemDescriptor {
    /// Create a descriptor with an identifier and URL, leaving optional metadata empty
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: String::new(),
            duration_secs: None,
            upload_date: None,
            url: url.into(),
        }
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the duration in seconds
    pub fn with_duration(mut self, secs: impl Into<f64>) -> Self {
        self.duration_secs = Some(secs.into());
        self
    }

    /// Set the upload date
    pub fn with_upload_date(mut self, date: NaiveDate) -> Self {
        self.upload_date = Some(date);
        self
    }

    /// Human-facing label: the title, or the identifier when the title is empty
    pub fn label(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else {
            self.id.as_deref().unwrap_or(&self.url)
        }
    }
}

/// Why the entry filter skipped an item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Identifier is already in the ledger
    AlreadyRecorded,
    /// A file for this item already exists in the destination
    FileExists,
    /// Duration is below the minimum or above the maximum
    DurationOutOfRange,
    /// Upload date is outside the configured window
    DateOutOfRange,
    /// Title does not match the configured pattern
    TitleMismatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::AlreadyRecorded => "already recorded",
            SkipReason::FileExists => "file already exists",
            SkipReason::DurationOutOfRange => "duration out of range",
            SkipReason::DateOutOfRange => "date out of range",
            SkipReason::TitleMismatch => "title mismatch",
        };
        f.write_str(reason)
    }
}

/// Entry filter verdict
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Acquire the item
    Keep,
    /// Leave the item alone
    Skip(SkipReason),
}

impl Decision {
    /// Returns true for [`Decision::Keep`]
    pub fn is_keep(&self) -> bool {
        matches!(self, Decision::Keep)
    }
}

/// Batch lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    /// Enumerating the source locator
    Resolving,
    /// Running the entry filter over resolved descriptors
    Filtering,
    /// Workers are acquiring kept items
    Dispatching,
    /// All dispatched items reached a terminal state
    Reporting,
    /// Batch finished
    Complete,
    /// Batch aborted before dispatch (resolution failure)
    Failed,
}

/// Terminal status of one item within a batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Download finished
    Succeeded,
    /// All attempts failed
    Failed {
        /// Last error encountered
        error: String,
    },
    /// Cancellation stopped dispatch before the item began
    NotStarted,
}

/// Outcome of one dispatched item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    /// Item identifier, if the origin supplied one
    pub id: Option<String>,
    /// Item title
    pub title: String,
    /// Terminal status
    #[serde(flatten)]
    pub status: ItemStatus,
    /// Number of download invocations made
    pub attempts: u32,
}

impl ItemOutcome {
    /// Returns true if the item was acquired
    pub fn is_success(&self) -> bool {
        matches!(self.status, ItemStatus::Succeeded)
    }
}

/// An item the filter decided not to acquire
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    /// Item identifier
    pub id: Option<String>,
    /// Item title
    pub title: String,
    /// Why it was skipped
    pub reason: SkipReason,
}

/// Aggregate result of one batch run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Number of descriptors the locator resolved to
    pub resolved: usize,
    /// Number of descriptors that passed the filter
    pub kept: usize,
    /// Items rejected by the filter
    pub skipped: Vec<SkippedItem>,
    /// Per-item outcomes in completion order
    pub outcomes: Vec<ItemOutcome>,
    /// Whether cancellation was requested during the run
    pub cancelled: bool,
}

impl BatchReport {
    /// Number of items acquired
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of items that exhausted their attempts
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ItemStatus::Failed { .. }))
            .count()
    }

    /// Number of kept items never started because of cancellation
    pub fn not_started(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ItemStatus::NotStarted))
            .count()
    }

    /// Failed items paired with their last error
    pub fn failures(&self) -> impl Iterator<Item = (&ItemOutcome, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            ItemStatus::Failed { error } => Some((o, error.as_str())),
            _ => None,
        })
    }
}

/// Event emitted during a batch run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Batch moved to a new state
    StateChanged {
        /// New state
        state: BatchState,
    },

    /// Locator resolved
    Resolved {
        /// Number of descriptors returned
        count: usize,
    },

    /// Resolution failed, batch aborted
    ResolutionFailed {
        /// Error message
        error: String,
    },

    /// Item rejected by the filter
    Skipped {
        /// Item identifier
        id: Option<String>,
        /// Item title
        title: String,
        /// Why it was skipped
        reason: SkipReason,
    },

    /// Item passed the filter and waits for a worker
    Queued {
        /// Item identifier
        id: Option<String>,
        /// Item title
        title: String,
    },

    /// A worker picked up the item
    Started {
        /// Item identifier
        id: Option<String>,
    },

    /// One attempt failed and another will follow
    AttemptFailed {
        /// Item identifier
        id: Option<String>,
        /// Attempt number that failed (1-based)
        attempt: u32,
        /// Configured attempt limit
        max_attempts: u32,
        /// Error message
        error: String,
        /// Backoff before the next attempt, in milliseconds
        retry_in_ms: u64,
    },

    /// Item acquired
    Completed {
        /// Item identifier
        id: Option<String>,
        /// Item title
        title: String,
    },

    /// Item failed terminally
    Failed {
        /// Item identifier
        id: Option<String>,
        /// Item title
        title: String,
        /// Last error
        error: String,
    },

    /// Ledger could not be written after a successful acquisition
    LedgerWriteFailed {
        /// Identifier that could not be recorded
        id: String,
        /// Error message
        error: String,
    },

    /// Batch finished
    Finished {
        /// Aggregate report
        report: BatchReport,
    },
}
