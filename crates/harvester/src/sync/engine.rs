//! The window-pagination sync engine.
//!
//! One pass over one dataset:
//!
//! 1. Resume point: the trailing record's date, or (for an empty dataset) the
//!    source's first available date.
//! 2. Eviction: everything in the resume date's period is dropped, since the
//!    previous run may have fetched that window before it was complete.
//! 3. Pagination: fixed-size windows from the start of that period until the
//!    window start passes today, bounded by `max_pages`. The scan of an
//!    empty dataset from a fixed floor waits for quota instead of stopping,
//!    and its pages do not count toward the bound.
//!
//! The engine never fails on fetch problems. Rate limiting, transport
//! failures and the page limit end pagination and are reported in
//! [`EngineReport::stop`], leaving every page merged so far in the dataset
//! for the publisher. Only an unreadable dataset is an error.

use chrono::NaiveDate;

use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{EngineReport, StopReason, SyncOptions};
use crate::dataset::{Dataset, DatasetError};
use crate::fetch::{FetchError, Fetcher, WaitPolicy};
use crate::source::{DataSource, StartPoint};

/// Who is being synced, and as of when.
#[derive(Debug, Clone, Copy)]
pub struct SyncRequest<'a> {
    pub member: &'a str,
    /// The member's token for the source API.
    pub access_token: &'a str,
    /// Pagination stops once a window would start after this date.
    pub today: NaiveDate,
}

/// Bring `dataset` up to date with `source`.
#[tracing::instrument(
    skip_all,
    fields(member = %request.member, source = %source.kind(), today = %request.today)
)]
pub async fn sync_dataset(
    source: &dyn DataSource,
    fetcher: &Fetcher,
    dataset: &mut Dataset,
    request: &SyncRequest<'_>,
    options: &SyncOptions,
    on_progress: Option<&ProgressCallback>,
) -> Result<EngineReport, DatasetError> {
    let layout = source.layout();
    let kind = source.kind();
    let member = request.member.to_string();

    // An empty dataset starting from a fixed floor may page through years of
    // empty windows. That scan waits for quota and ignores the page limit,
    // since nothing is published until it finds data.
    let mut scanning = false;

    let (start, evicted) = match layout.resume_cursor(dataset)? {
        Some(cursor) => {
            let evicted = layout.evict_partial(dataset, cursor, source.granularity())?;
            tracing::debug!(%cursor, evicted, "Resuming from existing data");
            emit(
                on_progress,
                SyncProgress::ResumeFrom {
                    member: member.clone(),
                    source: kind,
                    cursor,
                    evicted,
                },
            );
            (cursor, evicted)
        }
        None => match first_date(source, fetcher, request.access_token).await {
            Ok(first_date) => {
                scanning = matches!(
                    source.start_point(request.access_token),
                    StartPoint::Fixed(_)
                );
                tracing::debug!(%first_date, "Bootstrapping empty dataset");
                emit(
                    on_progress,
                    SyncProgress::Bootstrapped {
                        member: member.clone(),
                        source: kind,
                        first_date,
                    },
                );
                (first_date, 0)
            }
            Err(stop) => {
                report_stop(&stop, source, &member, None, on_progress);
                let mut report = EngineReport::new(None);
                report.stop = stop;
                return Ok(report);
            }
        },
    };

    let mut report = EngineReport::new(Some(start));
    report.evicted = evicted;

    let window = source.window();
    let realm = source.realm();
    let mut cursor = source.granularity().period_start(start);
    let mut page: u32 = 0;
    let mut limited: u32 = 0;

    while cursor <= request.today {
        scanning = scanning && dataset.is_empty();
        if limited >= options.max_pages {
            report.stop = StopReason::PageLimit;
            report_stop(&report.stop, source, &member, Some(cursor), on_progress);
            emit(
                on_progress,
                SyncProgress::PageLimitReached {
                    member: member.clone(),
                    source: kind,
                    max_pages: options.max_pages,
                },
            );
            break;
        }
        page += 1;
        if !scanning {
            limited += 1;
        }

        let url = source.page_url(cursor, request.access_token);
        let wait = if scanning {
            WaitPolicy::WaitForQuota
        } else {
            WaitPolicy::FailFast
        };
        let merged = match fetcher.get_json(&url, realm, wait).await {
            Ok(body) => layout.merge_page(dataset, body),
            Err(FetchError::Decode { message }) => Err(DatasetError::malformed_page(message)),
            Err(e) => {
                report.stop = match e {
                    FetchError::RateLimited { retry_after, .. } => {
                        StopReason::RateLimited { retry_after }
                    }
                    other => StopReason::Aborted {
                        error: other.to_string(),
                    },
                };
                report_stop(&report.stop, source, &member, Some(cursor), on_progress);
                break;
            }
        };

        report.pages_fetched += 1;
        match merged {
            Ok(added) => {
                if added == 0 {
                    report.empty_pages += 1;
                }
                report.records_added += added;
                tracing::debug!(window = %cursor, page, records = added, "Fetched window");
                emit(
                    on_progress,
                    SyncProgress::FetchedWindow {
                        member: member.clone(),
                        source: kind,
                        start: cursor,
                        page,
                        records: added,
                    },
                );
            }
            Err(e) => {
                report.empty_pages += 1;
                tracing::warn!(window = %cursor, page, "Skipping malformed page: {}", e);
                emit(
                    on_progress,
                    SyncProgress::MalformedPage {
                        member: member.clone(),
                        source: kind,
                        start: cursor,
                        error: e.to_string(),
                    },
                );
            }
        }

        cursor = window.advance(cursor);
    }

    tracing::info!(
        pages = report.pages_fetched,
        added = report.records_added,
        evicted = report.evicted,
        stop = ?report.stop,
        "Sync pass finished"
    );

    Ok(report)
}

/// Resolve the start date for an empty dataset.
async fn first_date(
    source: &dyn DataSource,
    fetcher: &Fetcher,
    access_token: &str,
) -> Result<NaiveDate, StopReason> {
    match source.start_point(access_token) {
        StartPoint::Fixed(date) => Ok(date),
        StartPoint::Profile { url } => {
            let profile = fetcher
                .get_json(&url, source.realm(), WaitPolicy::WaitForQuota)
                .await
                .map_err(|e| match e {
                    FetchError::RateLimited { retry_after, .. } => {
                        StopReason::RateLimited { retry_after }
                    }
                    other => StopReason::Aborted {
                        error: format!("profile lookup failed: {other}"),
                    },
                })?;

            source
                .parse_profile(&profile)
                .ok_or_else(|| StopReason::Aborted {
                    error: "profile response has no first date".to_string(),
                })
        }
    }
}

fn report_stop(
    stop: &StopReason,
    source: &dyn DataSource,
    member: &str,
    at: Option<NaiveDate>,
    on_progress: Option<&ProgressCallback>,
) {
    match stop {
        StopReason::RateLimited { retry_after } => {
            let retry_after = retry_after.unwrap_or_default();
            tracing::warn!(realm = source.realm(), ?retry_after, "Rate limited, stopping pagination");
            emit(
                on_progress,
                SyncProgress::RateLimited {
                    member: member.to_string(),
                    source: source.kind(),
                    realm: source.realm().to_string(),
                    retry_after,
                },
            );
        }
        StopReason::Aborted { error } => {
            tracing::warn!(window = ?at, "Fetch failed, stopping pagination: {}", error);
            emit(
                on_progress,
                SyncProgress::FetchAborted {
                    member: member.to_string(),
                    source: source.kind(),
                    start: at,
                    error: error.clone(),
                },
            );
        }
        StopReason::PageLimit => {
            tracing::warn!(window = ?at, "Page limit reached before catching up");
        }
        StopReason::CaughtUp => {}
    }
}
