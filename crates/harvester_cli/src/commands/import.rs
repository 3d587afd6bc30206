use std::path::Path;

use chrono::{DateTime, Utc};
use harvester::credentials::{CredentialStore, TokenSet};
use harvester::source::SourceKind;
use harvester::store::{self, NewLink};
use harvester::task::{SyncJob, TaskQueue};

use crate::commands::shared::{Services, drain, print_stats};
use crate::config::Config;

/// One line of a legacy member export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportRow {
    pub(crate) member_id: String,
    pub(crate) hub_refresh_token: String,
    pub(crate) source_refresh_token: String,
}

/// Parse `member_id<d>hub_refresh_token<d>source_refresh_token`.
///
/// Blank lines and `#` comments yield `None`.
pub(crate) fn parse_import_line(line: &str, delimiter: &str) -> Result<Option<ImportRow>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split(delimiter).map(str::trim).collect();
    match fields.as_slice() {
        [member, hub, source] if !member.is_empty() && !hub.is_empty() && !source.is_empty() => {
            Ok(Some(ImportRow {
                member_id: member.to_string(),
                hub_refresh_token: hub.to_string(),
                source_refresh_token: source.to_string(),
            }))
        }
        _ => Err(format!(
            "expected 3 non-empty fields separated by '{}', found {}",
            delimiter,
            fields.len()
        )),
    }
}

#[derive(Debug, Default)]
struct ImportCounts {
    imported: usize,
    existing: usize,
    invalid: usize,
    failed: usize,
}

/// Import legacy members, refresh their tokens and queue a first sync.
pub(crate) async fn handle_import(
    infile: &Path,
    delimiter: &str,
    source: SourceKind,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(infile)?;
    let services = Services::connect(config, database_url).await?;
    let queue = TaskQueue::start(services.task.clone(), config.queue_config(None));
    let mut counts = ImportCounts::default();

    for (index, line) in content.lines().enumerate() {
        let row = match parse_import_line(line, delimiter) {
            Ok(Some(row)) => row,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(line = index + 1, error = %e, "Skipping invalid line");
                counts.invalid += 1;
                continue;
            }
        };

        if store::find_member(&services.db, &row.member_id)
            .await?
            .is_some()
        {
            tracing::info!(member = %row.member_id, "Member already exists, skipping");
            counts.existing += 1;
            continue;
        }

        match import_member(&services, &row, source).await {
            Ok(()) => {
                tracing::info!(member = %row.member_id, source = %source, "Imported member");
                counts.imported += 1;
                queue.enqueue(SyncJob::new(row.member_id, source));
            }
            Err(e) => {
                tracing::warn!(member = %row.member_id, error = %e, "Import failed");
                counts.failed += 1;
            }
        }
    }

    println!(
        "Imported {} member(s); {} already present, {} invalid line(s), {} failed.",
        counts.imported, counts.existing, counts.invalid, counts.failed
    );

    let stats = drain(queue).await;
    print_stats(&stats);
    Ok(())
}

/// Store the member and link with expired placeholder tokens, then refresh
/// both so the first sync starts with live credentials.
async fn import_member(
    services: &Services,
    row: &ImportRow,
    source: SourceKind,
) -> Result<(), Box<dyn std::error::Error>> {
    let expired = DateTime::<Utc>::UNIX_EPOCH;

    store::upsert_member(
        &services.db,
        &row.member_id,
        "",
        &row.hub_refresh_token,
        expired,
    )
    .await?;
    store::upsert_link(
        &services.db,
        NewLink {
            member_id: row.member_id.clone(),
            source,
            tokens: TokenSet {
                access_token: String::new(),
                refresh_token: Some(row.source_refresh_token.clone()),
                expires_at: Some(expired),
            },
        },
    )
    .await?;

    services.credentials.hub_token(&row.member_id).await?;
    services
        .credentials
        .source_token(&row.member_id, source)
        .await?;
    Ok(())
}
