//! In-memory artifact store for tests (also built with the `test-util` feature).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ArtifactError, ArtifactInfo, ArtifactMetadata, ArtifactStore};

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub basename: String,
    pub body: Vec<u8>,
    pub tags: Vec<String>,
    pub metadata: Option<ArtifactMetadata>,
}

#[derive(Default)]
struct Inner {
    files: HashMap<String, Vec<StoredFile>>,
    ops: Vec<String>,
    fail_upload: bool,
    fail_delete: bool,
}

/// Files keyed by member id. Operations are recorded as `"list"`,
/// `"delete:<basename>"`, `"upload:<basename>"`.
#[derive(Default)]
pub struct MemoryArtifactStore {
    inner: Mutex<Inner>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .expect("memory store lock should not be poisoned")
    }

    pub fn put(&self, member_id: &str, basename: &str, tags: &[&str], body: &[u8]) {
        let mut inner = self.lock();
        inner
            .files
            .entry(member_id.to_string())
            .or_default()
            .push(StoredFile {
                basename: basename.to_string(),
                body: body.to_vec(),
                tags: tags.iter().map(|t| (*t).to_string()).collect(),
                metadata: None,
            });
    }

    pub fn file(&self, member_id: &str, basename: &str) -> Option<StoredFile> {
        let inner = self.lock();
        inner
            .files
            .get(member_id)?
            .iter()
            .find(|f| f.basename == basename)
            .cloned()
    }

    /// The stored body parsed as JSON.
    pub fn json(&self, member_id: &str, basename: &str) -> Option<serde_json::Value> {
        self.file(member_id, basename)
            .and_then(|f| serde_json::from_slice(&f.body).ok())
    }

    /// Number of upload attempts, failed ones included.
    pub fn uploads(&self) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| op.starts_with("upload:"))
            .count()
    }

    pub fn ops(&self) -> Vec<String> {
        self.lock().ops.clone()
    }

    pub fn fail_uploads(&self) {
        self.lock().fail_upload = true;
    }

    pub fn fail_deletes(&self) {
        self.lock().fail_delete = true;
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn list(&self, _token: &str, member_id: &str) -> Result<Vec<ArtifactInfo>, ArtifactError> {
        let mut inner = self.lock();
        inner.ops.push("list".to_string());
        Ok(inner
            .files
            .get(member_id)
            .map(|files| {
                files
                    .iter()
                    .map(|f| ArtifactInfo {
                        id: None,
                        basename: f.basename.clone(),
                        download_url: format!("memory://{member_id}/{}", f.basename),
                        tags: f.tags.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn download(&self, artifact: &ArtifactInfo) -> Result<Vec<u8>, ArtifactError> {
        let path = artifact
            .download_url
            .strip_prefix("memory://")
            .ok_or_else(|| ArtifactError::NotFound(artifact.download_url.clone()))?;
        let (member_id, basename) = path
            .split_once('/')
            .ok_or_else(|| ArtifactError::NotFound(artifact.download_url.clone()))?;
        self.file(member_id, basename)
            .map(|f| f.body)
            .ok_or_else(|| ArtifactError::NotFound(basename.to_string()))
    }

    async fn delete(
        &self,
        _token: &str,
        member_id: &str,
        basename: &str,
    ) -> Result<(), ArtifactError> {
        let mut inner = self.lock();
        inner.ops.push(format!("delete:{basename}"));
        if inner.fail_delete {
            return Err(ArtifactError::Transport("delete refused".into()));
        }
        if let Some(files) = inner.files.get_mut(member_id) {
            files.retain(|f| f.basename != basename);
        }
        Ok(())
    }

    async fn upload(
        &self,
        _token: &str,
        member_id: &str,
        basename: &str,
        body: Vec<u8>,
        metadata: &ArtifactMetadata,
    ) -> Result<(), ArtifactError> {
        let mut inner = self.lock();
        inner.ops.push(format!("upload:{basename}"));
        if inner.fail_upload {
            return Err(ArtifactError::Status {
                status: 500,
                message: "upload refused".into(),
            });
        }
        inner
            .files
            .entry(member_id.to_string())
            .or_default()
            .push(StoredFile {
                basename: basename.to_string(),
                body,
                tags: metadata.tags.clone(),
                metadata: Some(metadata.clone()),
            });
        Ok(())
    }
}
