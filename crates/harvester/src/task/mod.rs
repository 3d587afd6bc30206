//! The per-(member, source) sync run.
//!
//! A run moves through `ResolvingCredentials -> Loading -> Syncing ->
//! Publishing -> Done`. Any failure before publishing ends it in `Failed`
//! and leaves the member's artifact untouched. Once the engine has run, the
//! merged dataset is always published, even when pagination stopped early;
//! a rate-limited run then asks to be re-run through
//! [`RunOutcome::RetryAfter`]. Re-running is safe because every run rebuilds
//! its state from the published artifact.

pub mod queue;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::artifact::{ArtifactError, ArtifactStore};
use crate::credentials::{AuthError, CredentialStore};
use crate::dataset::DatasetError;
use crate::fetch::Fetcher;
use crate::source::{SourceKind, SourceRegistry};
use crate::store::{Bookkeeping, StoreError};
use crate::sync::{
    EngineReport, LoadError, ProgressCallback, PublishError, Published, StopReason, SyncOptions,
    SyncProgress, SyncRequest, emit, load_existing, publish, sync_dataset,
};

pub use queue::{DEFAULT_MAX_DEFERRALS, DEFAULT_WORKERS, QueueConfig, QueueStats, TaskQueue};

/// One unit of work: sync `source` for `member`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncJob {
    pub member: String,
    pub source: SourceKind,
}

impl SyncJob {
    pub fn new(member: impl Into<String>, source: SourceKind) -> Self {
        Self {
            member: member.into(),
            source,
        }
    }
}

impl std::fmt::Display for SyncJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.member, self.source)
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    ResolvingCredentials,
    Loading,
    Syncing,
    Publishing,
    Done,
    /// Published partial data; a re-run is scheduled.
    RateLimited,
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::ResolvingCredentials => "resolving-credentials",
            RunState::Loading => "loading",
            RunState::Syncing => "syncing",
            RunState::Publishing => "publishing",
            RunState::Done => "done",
            RunState::RateLimited => "rate-limited",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub job: SyncJob,
    /// Whether a previous artifact existed.
    pub found_existing: bool,
    pub report: EngineReport,
    pub published: Published,
}

/// How a run ended, when it did not fail.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Published; nothing further to do until the link goes stale.
    Done(RunSummary),
    /// Published partial data; run again after `delay`.
    RetryAfter { delay: Duration, summary: RunSummary },
}

impl RunOutcome {
    pub fn summary(&self) -> &RunSummary {
        match self {
            RunOutcome::Done(summary) | RunOutcome::RetryAfter { summary, .. } => summary,
        }
    }

    #[inline]
    pub fn is_retry(&self) -> bool {
        matches!(self, RunOutcome::RetryAfter { .. })
    }
}

/// Run failures. None of them publish anything.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("no source registered for {0}")]
    UnknownSource(SourceKind),

    #[error("could not load existing artifact: {0}")]
    Load(ArtifactError),

    #[error("existing data is unreadable: {0}")]
    Parse(DatasetError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("could not record sync: {0}")]
    Bookkeeping(#[from] StoreError),
}

impl From<LoadError> for TaskError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Store(e) => TaskError::Load(e),
            LoadError::Parse(e) => TaskError::Parse(e),
        }
    }
}

impl From<DatasetError> for TaskError {
    fn from(err: DatasetError) -> Self {
        TaskError::Parse(err)
    }
}

/// Error type for building a [`SyncTask`].
#[derive(Debug, Error)]
pub enum SyncTaskError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },
}

/// Builder for [`SyncTask`].
#[derive(Default)]
pub struct SyncTaskBuilder {
    credentials: Option<Arc<dyn CredentialStore>>,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    fetcher: Option<Fetcher>,
    sources: Option<SourceRegistry>,
    bookkeeping: Option<Arc<dyn Bookkeeping>>,
    options: Option<SyncOptions>,
    progress: Option<Arc<ProgressCallback>>,
}

impl SyncTaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn artifacts(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Enabled sources. Defaults to the built-in ones.
    pub fn sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn bookkeeping(mut self, bookkeeping: Arc<dyn Bookkeeping>) -> Self {
        self.bookkeeping = Some(bookkeeping);
        self
    }

    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn progress(mut self, callback: Arc<ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn build(self) -> Result<SyncTask, SyncTaskError> {
        Ok(SyncTask {
            credentials: self.credentials.ok_or(SyncTaskError::MissingField {
                field: "credentials",
            })?,
            artifacts: self
                .artifacts
                .ok_or(SyncTaskError::MissingField { field: "artifacts" })?,
            fetcher: self
                .fetcher
                .ok_or(SyncTaskError::MissingField { field: "fetcher" })?,
            bookkeeping: self.bookkeeping.ok_or(SyncTaskError::MissingField {
                field: "bookkeeping",
            })?,
            sources: self.sources.unwrap_or_else(SourceRegistry::builtin),
            options: self.options.unwrap_or_default(),
            progress: self.progress,
        })
    }
}

/// Everything a sync run needs. Cheap to clone; clones share all services.
#[derive(Clone)]
pub struct SyncTask {
    credentials: Arc<dyn CredentialStore>,
    artifacts: Arc<dyn ArtifactStore>,
    fetcher: Fetcher,
    sources: SourceRegistry,
    bookkeeping: Arc<dyn Bookkeeping>,
    options: SyncOptions,
    progress: Option<Arc<ProgressCallback>>,
}

impl SyncTask {
    pub fn builder() -> SyncTaskBuilder {
        SyncTaskBuilder::new()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub(crate) fn emit(&self, event: SyncProgress) {
        emit(self.progress.as_deref(), event);
    }

    fn set_state(&self, job: &SyncJob, state: RunState) {
        tracing::debug!(%job, %state, "Run state");
        self.emit(SyncProgress::StateChanged {
            member: job.member.clone(),
            source: job.source,
            state,
        });
    }

    /// Run `job` now. Safe to call repeatedly for the same job.
    pub async fn run(&self, job: &SyncJob) -> Result<RunOutcome, TaskError> {
        self.run_at(job, Utc::now()).await
    }

    /// Run `job` as of `now`: pagination stops at `now`'s date and the
    /// artifact is stamped with `now`.
    #[tracing::instrument(skip_all, fields(member = %job.member, source = %job.source))]
    pub async fn run_at(&self, job: &SyncJob, now: DateTime<Utc>) -> Result<RunOutcome, TaskError> {
        match self.execute(job, now).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(error = %err, "Sync run failed");
                self.emit(SyncProgress::RunFailed {
                    member: job.member.clone(),
                    source: job.source,
                    error: err.to_string(),
                });
                self.set_state(job, RunState::Failed);
                Err(err)
            }
        }
    }

    async fn execute(&self, job: &SyncJob, now: DateTime<Utc>) -> Result<RunOutcome, TaskError> {
        self.set_state(job, RunState::ResolvingCredentials);
        let source = self
            .sources
            .get(job.source)
            .ok_or(TaskError::UnknownSource(job.source))?;
        let hub_token = self.credentials.hub_token(&job.member).await?;
        let source_token = self
            .credentials
            .source_token(&job.member, job.source)
            .await?;

        self.set_state(job, RunState::Loading);
        let existing =
            load_existing(self.artifacts.as_ref(), source.as_ref(), &hub_token, &job.member)
                .await?;
        let found_existing = existing.artifact.is_some();
        self.emit(SyncProgress::LoadedExisting {
            member: job.member.clone(),
            source: job.source,
            found: found_existing,
            records: existing.dataset.len(),
        });
        let mut dataset = existing.dataset;

        self.set_state(job, RunState::Syncing);
        let request = SyncRequest {
            member: &job.member,
            access_token: &source_token,
            today: now.date_naive(),
        };
        let report = sync_dataset(
            source.as_ref(),
            &self.fetcher,
            &mut dataset,
            &request,
            &self.options,
            self.progress.as_deref(),
        )
        .await?;

        self.set_state(job, RunState::Publishing);
        let published = publish(
            self.artifacts.as_ref(),
            source.artifact(),
            &dataset,
            &hub_token,
            &job.member,
            now,
        )
        .await?;
        tracing::info!(
            basename = %published.basename,
            records = published.records,
            bytes = published.bytes,
            pages = report.pages_fetched,
            "Published artifact"
        );
        self.emit(SyncProgress::Published {
            member: job.member.clone(),
            source: job.source,
            basename: published.basename.clone(),
            records: published.records,
            bytes: published.bytes,
        });

        let retry = match &report.stop {
            StopReason::CaughtUp => {
                self.bookkeeping
                    .mark_synced(&job.member, job.source, now)
                    .await?;
                None
            }
            StopReason::RateLimited { retry_after } => Some(
                retry_after
                    .map_or(self.options.retry_after, |d| d.max(self.options.retry_after)),
            ),
            // Partial progress is published; the next scheduler pass continues.
            StopReason::PageLimit | StopReason::Aborted { .. } => None,
        };

        let summary = RunSummary {
            job: job.clone(),
            found_existing,
            report,
            published,
        };

        Ok(match retry {
            Some(delay) => {
                self.set_state(job, RunState::RateLimited);
                RunOutcome::RetryAfter { delay, summary }
            }
            None => {
                self.set_state(job, RunState::Done);
                RunOutcome::Done(summary)
            }
        })
    }
}
