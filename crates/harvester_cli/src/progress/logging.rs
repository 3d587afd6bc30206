use harvester::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::StateChanged {
                member,
                source,
                state,
            } => {
                tracing::debug!(member = %member, source = %source, state = %state, "State changed");
            }

            SyncProgress::LoadedExisting {
                member,
                source,
                found,
                records,
            } => {
                if found {
                    tracing::info!(member = %member, source = %source, records, "Loaded existing artifact");
                } else {
                    tracing::info!(member = %member, source = %source, "No existing artifact, starting fresh");
                }
            }

            SyncProgress::Bootstrapped {
                member,
                source,
                first_date,
            } => {
                tracing::info!(member = %member, source = %source, %first_date, "Starting from first available date");
            }

            SyncProgress::ResumeFrom {
                member,
                source,
                cursor,
                evicted,
            } => {
                tracing::info!(member = %member, source = %source, %cursor, evicted, "Resuming");
            }

            SyncProgress::FetchedWindow {
                member,
                source,
                start,
                page,
                records,
            } => {
                tracing::debug!(member = %member, source = %source, window = %start, page, records, "Fetched window");
            }

            SyncProgress::MalformedPage {
                member,
                source,
                start,
                error,
            } => {
                tracing::warn!(member = %member, source = %source, window = %start, error = %error, "Malformed page counted as empty");
            }

            SyncProgress::RateLimited {
                member,
                source,
                realm,
                retry_after,
            } => {
                tracing::warn!(
                    member = %member,
                    source = %source,
                    realm = %realm,
                    retry_after_secs = retry_after.as_secs(),
                    "Rate limited"
                );
            }

            SyncProgress::FetchAborted {
                member,
                source,
                start,
                error,
            } => {
                tracing::warn!(member = %member, source = %source, window = ?start, error = %error, "Fetch aborted, publishing partial data");
            }

            SyncProgress::PageLimitReached {
                member,
                source,
                max_pages,
            } => {
                tracing::warn!(member = %member, source = %source, max_pages, "Page limit reached");
            }

            SyncProgress::Published {
                member,
                source,
                basename,
                records,
                bytes,
            } => {
                tracing::info!(member = %member, source = %source, basename = %basename, records, bytes, "Published");
            }

            SyncProgress::RetryScheduled {
                member,
                source,
                delay,
                attempt,
            } => {
                tracing::info!(member = %member, source = %source, delay_secs = delay.as_secs(), attempt, "Retry scheduled");
            }

            SyncProgress::RunFailed {
                member,
                source,
                error,
            } => {
                tracing::error!(member = %member, source = %source, error = %error, "Sync failed");
            }

            SyncProgress::Warning { message } => {
                tracing::warn!("{}", message);
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
