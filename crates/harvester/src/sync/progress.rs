//! Progress reporting types for sync runs.
//!
//! Events are emitted through an optional callback so the CLI can turn them
//! into log lines without the library knowing how they are displayed.

use std::time::Duration;

use chrono::NaiveDate;

use crate::source::SourceKind;
use crate::task::RunState;

/// Progress events emitted during a sync run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// The orchestrator moved to a new state.
    StateChanged {
        member: String,
        source: SourceKind,
        state: RunState,
    },

    /// The prior artifact was loaded (or found missing).
    LoadedExisting {
        member: String,
        source: SourceKind,
        /// Whether an artifact existed.
        found: bool,
        records: usize,
    },

    /// An empty dataset got its start date from the source.
    Bootstrapped {
        member: String,
        source: SourceKind,
        first_date: NaiveDate,
    },

    /// Resuming from the trailing edge of existing data.
    ResumeFrom {
        member: String,
        source: SourceKind,
        cursor: NaiveDate,
        evicted: usize,
    },

    /// Fetched one window.
    FetchedWindow {
        member: String,
        source: SourceKind,
        start: NaiveDate,
        /// Page number (1-indexed).
        page: u32,
        records: usize,
    },

    /// A window's body could not be merged and was counted as empty.
    MalformedPage {
        member: String,
        source: SourceKind,
        start: NaiveDate,
        error: String,
    },

    /// Pagination stopped because the realm is out of budget.
    RateLimited {
        member: String,
        source: SourceKind,
        realm: String,
        retry_after: Duration,
    },

    /// Pagination stopped on a transport or server failure.
    FetchAborted {
        member: String,
        source: SourceKind,
        start: Option<NaiveDate>,
        error: String,
    },

    /// The page limit ended pagination before catching up.
    PageLimitReached {
        member: String,
        source: SourceKind,
        max_pages: u32,
    },

    /// The merged dataset replaced the previous artifact.
    Published {
        member: String,
        source: SourceKind,
        basename: String,
        records: usize,
        bytes: usize,
    },

    /// A run was deferred and re-queued.
    RetryScheduled {
        member: String,
        source: SourceKind,
        delay: Duration,
        attempt: u32,
    },

    /// A run failed before publishing.
    RunFailed {
        member: String,
        source: SourceKind,
        error: String,
    },

    /// Generic warning message.
    Warning { message: String },
}

/// Callback type for progress reporting.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Helper to emit progress events.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
