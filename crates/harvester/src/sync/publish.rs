//! Replaces a member's published artifact with the merged dataset.
//!
//! Replacement is delete-then-upload and is not transactional. If the upload
//! fails (or the process dies) after the delete succeeded, the member has no
//! artifact until the next successful run, which rebuilds it from the
//! source's first date. That window is reported as
//! [`PublishError::UploadAfterDelete`] so callers can log it loudly.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::artifact::{ArtifactError, ArtifactSpec, ArtifactStore};
use crate::dataset::Dataset;

#[derive(Debug, Error)]
pub enum PublishError {
    /// Nothing was changed on the hub.
    #[error("could not serialize dataset: {0}")]
    Serialize(String),

    /// Nothing was changed on the hub.
    #[error("could not delete previous artifact: {0}")]
    Delete(ArtifactError),

    /// The previous artifact is gone and the new one was not stored.
    #[error("upload failed after the previous artifact was deleted: {0}")]
    UploadAfterDelete(ArtifactError),
}

/// What was uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub basename: String,
    pub records: usize,
    pub bytes: usize,
    pub updated_at: DateTime<Utc>,
}

/// Delete the artifact at `spec.basename` and upload `dataset` in its place.
pub async fn publish(
    store: &dyn ArtifactStore,
    spec: &ArtifactSpec,
    dataset: &Dataset,
    hub_token: &str,
    member_id: &str,
    now: DateTime<Utc>,
) -> Result<Published, PublishError> {
    let body = dataset
        .to_json_bytes()
        .map_err(|e| PublishError::Serialize(e.to_string()))?;
    let bytes = body.len();

    store
        .delete(hub_token, member_id, spec.basename)
        .await
        .map_err(PublishError::Delete)?;
    tracing::debug!(member = %member_id, basename = spec.basename, "Deleted previous artifact");

    let metadata = spec.metadata(now);
    store
        .upload(hub_token, member_id, spec.basename, body, &metadata)
        .await
        .map_err(|e| {
            tracing::error!(
                member = %member_id,
                basename = spec.basename,
                "Upload failed after delete, member has no artifact until the next run: {}",
                e
            );
            PublishError::UploadAfterDelete(e)
        })?;

    tracing::debug!(member = %member_id, basename = spec.basename, bytes, "Uploaded artifact");

    Ok(Published {
        basename: spec.basename.to_string(),
        records: dataset.len(),
        bytes,
        updated_at: now,
    })
}
