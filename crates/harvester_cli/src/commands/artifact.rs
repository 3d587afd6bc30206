use harvester::credentials::CredentialStore;
use harvester::source::SourceKind;
use harvester::sync::find_artifact;

use crate::commands::shared::{Services, require_source};
use crate::config::Config;

/// Print the download URL of a member's current artifact for `source`.
pub(crate) async fn handle_artifact(
    member: &str,
    source: SourceKind,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::connect(config, database_url).await?;
    let data_source = require_source(services.task.sources(), source)?;

    let hub_token = services.credentials.hub_token(member).await?;
    match find_artifact(&services.hub, data_source.artifact(), &hub_token, member).await? {
        Some(artifact) => println!("{}", artifact.download_url),
        None => {
            return Err(format!("Member '{}' has no {} artifact", member, source).into());
        }
    }
    Ok(())
}
