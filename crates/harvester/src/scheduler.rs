//! Periodic scheduling of sync runs.
//!
//! A scheduler pass enumerates source links whose last successful sync is
//! older than the staleness threshold (or who never synced) and queues a run
//! for each. Links to sources the queue's task does not know are skipped.

use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;

use crate::store::{self, StoreError};
use crate::sync::STALE_AFTER_DAYS;
use crate::task::{SyncJob, TaskQueue};

/// Default staleness threshold.
pub fn default_stale_after() -> Duration {
    Duration::days(STALE_AFTER_DAYS)
}

/// Counts from one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    /// Links considered.
    pub candidates: usize,
    pub enqueued: usize,
    /// Already pending in the queue.
    pub already_pending: usize,
    /// Source not enabled in this process.
    pub skipped: usize,
}

/// Jobs for every link not synced since `now - stale_after`.
pub async fn stale_jobs(
    db: &DatabaseConnection,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<SyncJob>, StoreError> {
    let links = store::find_stale_links(db, now - stale_after).await?;
    Ok(links
        .into_iter()
        .map(|link| SyncJob::new(link.member_id, link.source))
        .collect())
}

/// Jobs for every link, stale or not.
pub async fn all_jobs(db: &DatabaseConnection) -> Result<Vec<SyncJob>, StoreError> {
    let links = store::list_links(db).await?;
    Ok(links
        .into_iter()
        .map(|link| SyncJob::new(link.member_id, link.source))
        .collect())
}

/// Queue `jobs`, skipping sources the queue cannot run.
pub fn dispatch(queue: &TaskQueue, jobs: Vec<SyncJob>) -> ScheduleReport {
    let mut report = ScheduleReport {
        candidates: jobs.len(),
        ..ScheduleReport::default()
    };

    for job in jobs {
        if queue.sources().get(job.source).is_none() {
            tracing::debug!(%job, "Source disabled, skipping");
            report.skipped += 1;
        } else if queue.enqueue(job) {
            report.enqueued += 1;
        } else {
            report.already_pending += 1;
        }
    }

    tracing::info!(
        candidates = report.candidates,
        enqueued = report.enqueued,
        already_pending = report.already_pending,
        skipped = report.skipped,
        "Scheduler pass"
    );
    report
}

/// One scheduler pass over stale links.
pub async fn enqueue_stale(
    db: &DatabaseConnection,
    queue: &TaskQueue,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> Result<ScheduleReport, StoreError> {
    let jobs = stale_jobs(db, stale_after, now).await?;
    Ok(dispatch(queue, jobs))
}

/// Queue every link regardless of when it last synced.
pub async fn enqueue_all(
    db: &DatabaseConnection,
    queue: &TaskQueue,
) -> Result<ScheduleReport, StoreError> {
    let jobs = all_jobs(db).await?;
    Ok(dispatch(queue, jobs))
}
