use std::time::Duration;

use chrono::Utc;
use harvester::scheduler;
use harvester::task::TaskQueue;

use crate::commands::shared::{Services, print_stats};
use crate::config::Config;
use crate::shutdown::{is_shutdown_requested, wait_for_shutdown};

/// Keep workers running and schedule stale links every `interval`.
pub(crate) async fn handle_daemon(
    interval: Duration,
    workers: Option<usize>,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::connect(config, database_url).await?;
    let queue = TaskQueue::start(services.task.clone(), config.queue_config(workers));

    tracing::info!(
        interval_secs = interval.as_secs(),
        workers = config.queue_config(workers).workers,
        "Daemon started"
    );

    while !is_shutdown_requested() {
        match scheduler::enqueue_stale(&services.db, &queue, config.stale_after(), Utc::now()).await
        {
            Ok(report) => tracing::debug!(enqueued = report.enqueued, "Scheduled stale links"),
            // The next pass retries.
            Err(e) => tracing::error!(error = %e, "Scheduler pass failed"),
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = wait_for_shutdown() => break,
        }
    }

    tracing::info!(outstanding = queue.outstanding(), "Daemon stopping");
    let stats = queue.shutdown().await;
    print_stats(&stats);
    Ok(())
}
