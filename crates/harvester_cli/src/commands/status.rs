use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use harvester::entity::source_link;
use harvester::store;

use crate::config::Config;

/// Output format for the status display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// One source link for display.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct LinkStatus {
    #[tabled(rename = "Member")]
    pub member: String,
    #[tabled(rename = "Source")]
    pub source: String,
    #[tabled(rename = "Last Synced")]
    pub last_synced: String,
    #[tabled(rename = "Due")]
    pub due: bool,
    #[tabled(rename = "Token Expires")]
    pub token_expires: String,
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

pub(crate) fn link_statuses(
    links: &[source_link::Model],
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Vec<LinkStatus> {
    let cutoff = now - stale_after;
    links
        .iter()
        .map(|link| {
            let last_synced = link.last_synced_at.map(|t| t.with_timezone(&Utc));
            LinkStatus {
                member: link.member_id.clone(),
                source: link.source.to_string(),
                last_synced: format_time(last_synced),
                due: last_synced.is_none_or(|t| t < cutoff),
                token_expires: link
                    .token_expires_at
                    .map(|t| format_time(Some(t.with_timezone(&Utc))))
                    .unwrap_or_else(|| "-".to_string()),
            }
        })
        .collect()
}

/// Show every source link with its last sync time.
pub(crate) async fn handle_status(
    output: OutputFormat,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = harvester::connect_and_migrate(database_url).await?;
    let links = store::list_links(&db).await?;
    let items = link_statuses(&links, Utc::now(), config.stale_after());

    match output {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No linked sources.");
            } else {
                let mut table = tabled::Table::new(items);
                table.with(tabled::settings::Style::rounded());
                println!("{}", table);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use harvester::source::SourceKind;
    use sea_orm::prelude::Uuid;

    use super::*;

    fn link(member: &str, last_synced: Option<DateTime<Utc>>) -> source_link::Model {
        source_link::Model {
            id: Uuid::nil(),
            member_id: member.to_string(),
            source: SourceKind::Moves,
            access_token: "tok".to_string(),
            refresh_token: None,
            token_expires_at: None,
            last_synced_at: last_synced.map(|t| t.fixed_offset()),
            created_at: Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap().fixed_offset(),
        }
    }

    #[test]
    fn marks_never_synced_and_stale_links_due() {
        let now = Utc.with_ymd_and_hms(2016, 6, 24, 12, 0, 0).unwrap();
        let links = vec![
            link("fresh", Some(now - Duration::days(1))),
            link("stale", Some(now - Duration::days(5))),
            link("new", None),
        ];

        let rows = link_statuses(&links, now, Duration::days(4));
        assert!(!rows[0].due);
        assert_eq!(rows[0].last_synced, "2016-06-23 12:00 UTC");
        assert!(rows[1].due);
        assert!(rows[2].due);
        assert_eq!(rows[2].last_synced, "never");
        assert_eq!(rows[2].token_expires, "-");
        assert_eq!(rows[2].source, "moves");
    }

    #[test]
    fn json_output_has_field_names() {
        let now = Utc.with_ymd_and_hms(2016, 6, 24, 12, 0, 0).unwrap();
        let rows = link_statuses(&[link("m-1", None)], now, Duration::days(4));
        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(json[0]["member"], "m-1");
        assert_eq!(json[0]["due"], true);
    }
}
