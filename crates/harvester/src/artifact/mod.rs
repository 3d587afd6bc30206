//! Published artifacts on the data-sharing hub.
//!
//! Each (member, source) pair has exactly one live artifact, a JSON file
//! with a fixed per-source basename. It is replaced wholesale on every sync.

pub mod hub;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use hub::HubClient;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryArtifactStore;

/// Static description of a source's artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    /// Fixed file name; no versioning.
    pub basename: &'static str,
    pub description: &'static str,
    pub tags: &'static [&'static str],
    /// Tag identifying this source's file among the member's files.
    pub match_tag: &'static str,
}

impl ArtifactSpec {
    /// Metadata for an upload happening at `updated_at`.
    pub fn metadata(&self, updated_at: DateTime<Utc>) -> ArtifactMetadata {
        ArtifactMetadata {
            description: self.description.to_string(),
            tags: self.tags.iter().map(|t| (*t).to_string()).collect(),
            updated_at,
        }
    }
}

/// A file the hub holds for a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub id: Option<u64>,
    pub basename: String,
    pub download_url: String,
    pub tags: Vec<String>,
}

impl ArtifactInfo {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Metadata attached to every upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub description: String,
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Errors from the artifact store.
#[derive(Debug, Clone, Error)]
pub enum ArtifactError {
    /// The hub rejected the member's token.
    #[error("hub rejected the access token")]
    Unauthorized,

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("hub returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("hub transport error: {0}")]
    Transport(String),

    #[error("unexpected hub response: {0}")]
    Decode(String),
}

impl ArtifactError {
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// The hub's per-member file storage.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Every file the hub holds for the member owning `token`.
    async fn list(&self, token: &str, member_id: &str) -> Result<Vec<ArtifactInfo>, ArtifactError>;

    /// Raw content of a listed file.
    async fn download(&self, artifact: &ArtifactInfo) -> Result<Vec<u8>, ArtifactError>;

    /// Remove every file named `basename`. Deleting a missing file is not an error.
    async fn delete(&self, token: &str, member_id: &str, basename: &str)
    -> Result<(), ArtifactError>;

    async fn upload(
        &self,
        token: &str,
        member_id: &str,
        basename: &str,
        body: Vec<u8>,
        metadata: &ArtifactMetadata,
    ) -> Result<(), ArtifactError>;
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn metadata_copies_spec_and_timestamp() {
        let spec = ArtifactSpec {
            basename: "x.json",
            description: "X data.",
            tags: &["X", "data"],
            match_tag: "X",
        };
        let at = Utc.with_ymd_and_hms(2016, 6, 24, 0, 0, 0).unwrap();
        let meta = spec.metadata(at);
        assert_eq!(meta.description, "X data.");
        assert_eq!(meta.tags, vec!["X".to_string(), "data".to_string()]);
        assert_eq!(meta.updated_at, at);
    }

    #[test]
    fn has_tag_is_exact() {
        let info = ArtifactInfo {
            id: Some(1),
            basename: "moves-storyline-data.json".into(),
            download_url: "https://files/1".into(),
            tags: vec!["GPS".into(), "Moves".into()],
        };
        assert!(info.has_tag("Moves"));
        assert!(!info.has_tag("moves"));
    }
}
