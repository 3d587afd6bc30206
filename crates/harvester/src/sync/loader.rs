//! Loads the previously published artifact for a member and source.

use thiserror::Error;

use crate::artifact::{ArtifactError, ArtifactInfo, ArtifactSpec, ArtifactStore};
use crate::dataset::{Dataset, DatasetError};
use crate::source::DataSource;

/// Errors loading prior data. Both are fatal to a run: publishing after a
/// failed load could overwrite good history with a rebuilt partial one.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not fetch existing artifact: {0}")]
    Store(#[from] ArtifactError),

    #[error("existing artifact is unreadable: {0}")]
    Parse(#[from] DatasetError),
}

/// The prior dataset and the artifact it came from.
#[derive(Debug, Clone)]
pub struct Existing {
    pub dataset: Dataset,
    /// `None` when the member has no artifact for this source yet.
    pub artifact: Option<ArtifactInfo>,
}

/// First of the member's files tagged for this source.
pub async fn find_artifact(
    store: &dyn ArtifactStore,
    spec: &ArtifactSpec,
    hub_token: &str,
    member_id: &str,
) -> Result<Option<ArtifactInfo>, ArtifactError> {
    let files = store.list(hub_token, member_id).await?;
    Ok(files.into_iter().find(|f| f.has_tag(spec.match_tag)))
}

/// Download and parse the member's artifact, or start from an empty dataset.
pub async fn load_existing(
    store: &dyn ArtifactStore,
    source: &dyn DataSource,
    hub_token: &str,
    member_id: &str,
) -> Result<Existing, LoadError> {
    let layout = source.layout();

    let Some(artifact) = find_artifact(store, source.artifact(), hub_token, member_id).await?
    else {
        tracing::debug!(member = %member_id, source = %source.kind(), "No existing artifact");
        return Ok(Existing {
            dataset: layout.empty(),
            artifact: None,
        });
    };

    let body = store.download(&artifact).await?;
    let dataset = layout.parse(&body)?;

    tracing::debug!(
        member = %member_id,
        source = %source.kind(),
        basename = %artifact.basename,
        records = dataset.len(),
        "Loaded existing artifact"
    );

    Ok(Existing {
        dataset,
        artifact: Some(artifact),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::memory::MemoryArtifactStore;
    use crate::source::{Moves, RescueTime};

    #[tokio::test]
    async fn missing_artifact_yields_empty_dataset() {
        let store = MemoryArtifactStore::new();
        store.put("m1", "other.json", &["Other"], b"{}");

        let existing = load_existing(&store, &Moves::default(), "tok", "m1")
            .await
            .unwrap();
        assert!(existing.artifact.is_none());
        assert_eq!(existing.dataset, Dataset::Records(Vec::new()));

        let existing = load_existing(&store, &RescueTime::default(), "tok", "m1")
            .await
            .unwrap();
        assert!(matches!(existing.dataset, Dataset::Table(ref t) if t.rows.is_empty()));
    }

    #[tokio::test]
    async fn picks_first_file_with_source_tag() {
        let store = MemoryArtifactStore::new();
        store.put(
            "m1",
            "moves-storyline-data.json",
            &["GPS", "Moves", "steps"],
            br#"[{"date":"20160601"}]"#,
        );
        store.put("m1", "moves-old.json", &["Moves"], b"[]");

        let existing = load_existing(&store, &Moves::default(), "tok", "m1")
            .await
            .unwrap();
        assert_eq!(existing.dataset.len(), 1);
        assert_eq!(
            existing.artifact.unwrap().basename,
            "moves-storyline-data.json"
        );
    }

    #[tokio::test]
    async fn malformed_artifact_is_a_parse_error() {
        let store = MemoryArtifactStore::new();
        store.put("m1", "moves-storyline-data.json", &["Moves"], b"{\"truncated\": ");

        let err = load_existing(&store, &Moves::default(), "tok", "m1")
            .await
            .expect_err("malformed");
        assert!(matches!(err, LoadError::Parse(DatasetError::Malformed { .. })));
    }

    #[tokio::test]
    async fn find_artifact_returns_download_url() {
        let store = MemoryArtifactStore::new();
        store.put("m1", "rescuetime.json", &["RescueTime"], b"{}");

        let found = find_artifact(&store, RescueTime::default().artifact(), "tok", "m1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.download_url, "memory://m1/rescuetime.json");

        assert!(
            find_artifact(&store, Moves::default().artifact(), "tok", "m1")
                .await
                .unwrap()
                .is_none()
        );
    }
}
