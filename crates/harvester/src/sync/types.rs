//! Shared sync types and constants.

use std::time::Duration;

use chrono::NaiveDate;

/// Upper bound on pages fetched in one run (ten years of weekly windows).
pub const DEFAULT_MAX_PAGES: u32 = 520;

/// Delay before a rate-limited run is re-queued.
pub const RATE_LIMIT_RETRY_SECS: u64 = 61;

/// A link synced longer ago than this is due for a refresh.
pub const STALE_AFTER_DAYS: i64 = 4;

/// Maximum backoff delay in milliseconds for transient failures.
pub const MAX_BACKOFF_MS: u64 = 10_000;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 500;

/// Maximum in-place retries for a transient page failure.
pub const MAX_TRANSIENT_RETRIES: usize = 3;

/// Per-run sync options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Stop paginating after this many page requests.
    pub max_pages: u32,
    /// Minimum delay before a rate-limited run is re-run.
    pub retry_after: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            retry_after: Duration::from_secs(RATE_LIMIT_RETRY_SECS),
        }
    }
}

/// Why pagination ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The cursor passed today.
    CaughtUp,
    /// `max_pages` was reached before catching up.
    PageLimit,
    /// The limiter or the source refused a call.
    RateLimited { retry_after: Option<Duration> },
    /// A transport or server failure ended pagination early.
    Aborted { error: String },
}

impl StopReason {
    #[inline]
    pub fn is_caught_up(&self) -> bool {
        matches!(self, Self::CaughtUp)
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// What one engine pass did to a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReport {
    /// First window requested, if the start could be determined.
    pub start: Option<NaiveDate>,
    /// Entries dropped from the trailing partial window.
    pub evicted: usize,
    /// Page requests that returned a response, empty or not.
    pub pages_fetched: u32,
    /// Pages that were empty or malformed.
    pub empty_pages: u32,
    pub records_added: usize,
    pub stop: StopReason,
}

impl EngineReport {
    pub(crate) fn new(start: Option<NaiveDate>) -> Self {
        Self {
            start,
            evicted: 0,
            pages_fetched: 0,
            empty_pages: 0,
            records_added: 0,
            stop: StopReason::CaughtUp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = SyncOptions::default();
        assert_eq!(options.max_pages, 520);
        assert_eq!(options.retry_after, Duration::from_secs(61));
    }

    #[test]
    fn stop_reason_predicates() {
        assert!(StopReason::CaughtUp.is_caught_up());
        assert!(!StopReason::PageLimit.is_caught_up());
        assert!(StopReason::RateLimited { retry_after: None }.is_rate_limited());
        assert!(
            !StopReason::Aborted {
                error: "x".into()
            }
            .is_rate_limited()
        );
    }
}
