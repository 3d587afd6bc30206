use std::sync::Arc;
use std::time::Duration;

use harvester::credentials::DbCredentialStore;
use harvester::http::{HttpTransport, ReqwestTransport};
use harvester::rate_limit::RealmRateLimiter;
use harvester::source::{DataSource, Moves, RescueTime, SourceKind, SourceRegistry};
use harvester::store::Bookkeeping;
use harvester::task::{QueueStats, SyncTask, TaskQueue};
use harvester::{Fetcher, HubClient};
use sea_orm::DatabaseConnection;

use crate::config::Config;
use crate::progress::reporter_callback;
use crate::shutdown::wait_for_shutdown;

/// Timeout for a single HTTP request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything a command needs to talk to the hub and the sources.
pub(crate) struct Services {
    pub(crate) db: Arc<DatabaseConnection>,
    pub(crate) hub: HubClient,
    pub(crate) credentials: Arc<DbCredentialStore>,
    pub(crate) task: SyncTask,
}

impl Services {
    pub(crate) async fn connect(
        config: &Config,
        database_url: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let db = harvester::connect_and_migrate(database_url).await?;
        Self::build(config, Arc::new(db))
    }

    pub(crate) fn build(
        config: &Config,
        db: Arc<DatabaseConnection>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::with_timeout(REQUEST_TIMEOUT)?);
        let sources = build_sources(config);
        let limiter = build_limiter(config, &sources);

        let hub = HubClient::with_base_url(Arc::clone(&transport), config.hub.base_url.as_str());
        let hub_provider = config.hub_provider(hub.token_url())?;

        let mut credentials =
            DbCredentialStore::new(Arc::clone(&db), Arc::clone(&transport), hub_provider);
        for kind in SourceKind::all() {
            match config.source_provider(kind) {
                Some(provider) => credentials = credentials.with_source(kind, provider),
                None => tracing::debug!(source = %kind, "No OAuth client configured"),
            }
        }
        let credentials = Arc::new(credentials);

        let bookkeeping: Arc<dyn Bookkeeping> = db.clone();
        let task = SyncTask::builder()
            .credentials(credentials.clone())
            .artifacts(Arc::new(hub.clone()))
            .fetcher(Fetcher::new(transport, Arc::new(limiter)))
            .sources(sources)
            .bookkeeping(bookkeeping)
            .options(config.sync_options())
            .progress(reporter_callback())
            .build()?;

        Ok(Self {
            db,
            hub,
            credentials,
            task,
        })
    }
}

/// The built-in sources with their configured overrides.
pub(crate) fn build_sources(config: &Config) -> SourceRegistry {
    let moves = match &config.moves.api_url {
        Some(url) => Moves::with_api_base(url.as_str()),
        None => Moves::default(),
    };

    let mut rescuetime = RescueTime::default();
    if let Some(url) = &config.rescuetime.api_url {
        rescuetime = rescuetime.with_api_url(url.as_str());
    }
    if let Some(first_date) = config.rescuetime.first_date {
        rescuetime = rescuetime.with_first_date(first_date);
    }

    SourceRegistry::new()
        .with(Arc::new(moves))
        .with(Arc::new(rescuetime))
}

/// One limiter shared by every run, with a realm per source.
pub(crate) fn build_limiter(config: &Config, sources: &SourceRegistry) -> RealmRateLimiter {
    let mut builder = RealmRateLimiter::builder();
    for source in sources.iter() {
        let quota = config
            .quota(source.kind())
            .unwrap_or_else(|| source.default_quota());
        builder = builder.realm(source.realm(), quota);
    }
    builder.build()
}

/// Look up a source the CLI can run.
pub(crate) fn require_source(
    sources: &SourceRegistry,
    kind: SourceKind,
) -> Result<Arc<dyn DataSource>, Box<dyn std::error::Error>> {
    sources
        .get(kind)
        .ok_or_else(|| format!("Source '{}' is not enabled", kind).into())
}

/// Wait for the queue to drain, or for Ctrl+C, then stop it.
pub(crate) async fn drain(queue: TaskQueue) -> QueueStats {
    tokio::select! {
        () = queue.wait_idle() => {}
        () = wait_for_shutdown() => {
            tracing::warn!(outstanding = queue.outstanding(), "Stopping; deferred jobs will be dropped");
        }
    }
    queue.shutdown().await
}

/// Print a one-line summary of a queue's work.
pub(crate) fn print_stats(stats: &QueueStats) {
    println!(
        "{} enqueued, {} completed, {} deferred, {} failed, {} abandoned",
        stats.enqueued,
        console::style(stats.completed).green(),
        stats.deferred,
        console::style(stats.failed).red(),
        stats.abandoned,
    );
}
