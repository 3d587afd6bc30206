use harvester::source::SourceKind;
use harvester::store;
use harvester::task::{SyncJob, TaskQueue};

use crate::commands::shared::{Services, drain, print_stats};
use crate::config::Config;

/// Sync one member now, for one source or every linked one.
pub(crate) async fn handle_sync(
    member: &str,
    source: Option<SourceKind>,
    workers: Option<usize>,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::connect(config, database_url).await?;

    let sources = match source {
        Some(kind) => vec![kind],
        None => store::list_links(&services.db)
            .await?
            .into_iter()
            .filter(|link| link.member_id == member)
            .map(|link| link.source)
            .collect(),
    };
    if sources.is_empty() {
        return Err(format!(
            "Member '{}' has no linked sources. Link one with: harvester link {} --source <SOURCE>",
            member, member
        )
        .into());
    }

    let queue = TaskQueue::start(services.task.clone(), config.queue_config(workers));
    for kind in sources {
        queue.enqueue(SyncJob::new(member, kind));
    }

    let stats = drain(queue).await;
    print_stats(&stats);

    if stats.failed > 0 {
        return Err(format!("{} sync run(s) failed", stats.failed).into());
    }
    Ok(())
}
