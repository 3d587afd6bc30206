use chrono::{DateTime, Utc};
use harvester::credentials::{CredentialStore, TokenSet};
use harvester::source::SourceKind;
use harvester::store::{self, NewLink};
use harvester::ArtifactStore;

use crate::commands::shared::{Services, require_source};
use crate::config::Config;

/// Link a member to a source from a refresh token.
///
/// The access token is fetched right away, so a bad refresh token is
/// reported here rather than on the first sync.
pub(crate) async fn handle_link(
    member: &str,
    source: SourceKind,
    refresh_token: &str,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::connect(config, database_url).await?;

    if store::find_member(&services.db, member).await?.is_none() {
        return Err(format!(
            "Unknown member '{}'. Import it first with: harvester import --infile <FILE>",
            member
        )
        .into());
    }

    store::upsert_link(
        &services.db,
        NewLink {
            member_id: member.to_string(),
            source,
            tokens: TokenSet {
                access_token: String::new(),
                refresh_token: Some(refresh_token.to_string()),
                expires_at: Some(DateTime::<Utc>::UNIX_EPOCH),
            },
        },
    )
    .await?;
    services.credentials.source_token(member, source).await?;

    println!("Linked {} to {}.", member, source);
    Ok(())
}

/// Delete the member's artifact for `source` from the hub, then the link.
pub(crate) async fn handle_unlink(
    member: &str,
    source: SourceKind,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::connect(config, database_url).await?;
    let data_source = require_source(services.task.sources(), source)?;

    let hub_token = services.credentials.hub_token(member).await?;
    let basename = data_source.artifact().basename;
    services.hub.delete(&hub_token, member, basename).await?;
    tracing::info!(member = %member, source = %source, basename, "Deleted artifact");

    let removed = store::delete_link(&services.db, member, source).await?;
    if removed == 0 {
        println!("Deleted {} artifact; {} had no {} link.", source, member, source);
    } else {
        println!("Unlinked {} from {}.", member, source);
    }
    Ok(())
}
