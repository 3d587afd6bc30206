use chrono::Utc;
use harvester::scheduler;
use harvester::task::TaskQueue;

use crate::commands::shared::{Services, drain, print_stats};
use crate::config::Config;

/// Run one scheduler pass and wait for the queued syncs to finish.
pub(crate) async fn handle_update(
    all: bool,
    workers: Option<usize>,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::connect(config, database_url).await?;
    let queue = TaskQueue::start(services.task.clone(), config.queue_config(workers));

    let report = if all {
        scheduler::enqueue_all(&services.db, &queue).await?
    } else {
        scheduler::enqueue_stale(&services.db, &queue, config.stale_after(), Utc::now()).await?
    };

    if report.enqueued == 0 {
        println!("Nothing to update.");
    } else {
        println!(
            "Updating {} of {} link(s)...",
            report.enqueued, report.candidates
        );
    }

    let stats = drain(queue).await;
    print_stats(&stats);
    Ok(())
}
