//! Client for the hub's direct-sharing file API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{ArtifactError, ArtifactInfo, ArtifactMetadata, ArtifactStore};
use crate::fetch::truncate_body;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};

pub const DEFAULT_BASE_URL: &str = "https://www.openhumans.org";

const EXCHANGE_MEMBER: &str = "/api/direct-sharing/project/exchange-member/";
const DELETE_FILE: &str = "/api/direct-sharing/project/files/delete/";
const UPLOAD_DIRECT: &str = "/api/direct-sharing/project/files/upload/direct/";
const UPLOAD_COMPLETE: &str = "/api/direct-sharing/project/files/upload/complete/";

#[derive(Debug, Deserialize)]
struct MemberResponse {
    #[serde(default)]
    data: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: Option<u64>,
    basename: String,
    download_url: String,
    #[serde(default)]
    metadata: FileMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct FileMetadata {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DirectUpload {
    id: u64,
    url: String,
}

/// [`ArtifactStore`] backed by the hub's HTTP API.
#[derive(Clone)]
pub struct HubClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl HubClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_base_url(transport, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The hub's OAuth2 token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token/", self.base_url)
    }

    fn endpoint(&self, path: &str, token: &str) -> Result<String, ArtifactError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ArtifactError::Transport(format!("invalid hub URL: {e}")))?;
        url.query_pairs_mut().append_pair("access_token", token);
        Ok(url.to_string())
    }

    async fn send(&self, request: HttpRequest, what: &str) -> Result<HttpResponse, ArtifactError> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ArtifactError::Transport(e.to_string()))?;

        match response.status {
            s if (200..300).contains(&s) => Ok(response),
            401 | 403 => Err(ArtifactError::Unauthorized),
            404 => Err(ArtifactError::NotFound(what.to_string())),
            status => Err(ArtifactError::Status {
                status,
                message: truncate_body(response.text()),
            }),
        }
    }
}

#[async_trait]
impl ArtifactStore for HubClient {
    async fn list(&self, token: &str, member_id: &str) -> Result<Vec<ArtifactInfo>, ArtifactError> {
        let url = self.endpoint(EXCHANGE_MEMBER, token)?;
        let response = self.send(HttpRequest::get(url), "member").await?;
        let member: MemberResponse = serde_json::from_slice(&response.body)
            .map_err(|e| ArtifactError::Decode(e.to_string()))?;

        tracing::debug!(member = %member_id, files = member.data.len(), "Listed hub files");

        Ok(member
            .data
            .into_iter()
            .map(|f| ArtifactInfo {
                id: f.id,
                basename: f.basename,
                download_url: f.download_url,
                tags: f.metadata.tags,
            })
            .collect())
    }

    async fn download(&self, artifact: &ArtifactInfo) -> Result<Vec<u8>, ArtifactError> {
        let response = self
            .send(HttpRequest::get(artifact.download_url.clone()), &artifact.basename)
            .await?;
        Ok(response.body)
    }

    async fn delete(
        &self,
        token: &str,
        member_id: &str,
        basename: &str,
    ) -> Result<(), ArtifactError> {
        let url = self.endpoint(DELETE_FILE, token)?;
        let body = json!({
            "project_member_id": member_id,
            "file_basename": basename,
        });

        match self.send(HttpRequest::post_json(url, &body), basename).await {
            Ok(_) => Ok(()),
            Err(ArtifactError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn upload(
        &self,
        token: &str,
        member_id: &str,
        basename: &str,
        body: Vec<u8>,
        metadata: &ArtifactMetadata,
    ) -> Result<(), ArtifactError> {
        let url = self.endpoint(UPLOAD_DIRECT, token)?;
        let request = json!({
            "project_member_id": member_id,
            "filename": basename,
            "metadata": metadata,
        });
        let response = self
            .send(HttpRequest::post_json(url, &request), basename)
            .await?;
        let target: DirectUpload = serde_json::from_slice(&response.body)
            .map_err(|e| ArtifactError::Decode(e.to_string()))?;

        self.send(HttpRequest::put(target.url, body), basename)
            .await?;

        let url = self.endpoint(UPLOAD_COMPLETE, token)?;
        let complete = json!({
            "project_member_id": member_id,
            "file_id": target.id,
        });
        self.send(HttpRequest::post_json(url, &complete), basename)
            .await?;

        tracing::debug!(member = %member_id, basename, file_id = target.id, "Uploaded hub file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::http::{HttpMethod, MockTransport};

    const BASE: &str = "https://hub.test";

    fn client(transport: &MockTransport) -> HubClient {
        HubClient::with_base_url(Arc::new(transport.clone()), format!("{BASE}/"))
    }

    fn metadata() -> ArtifactMetadata {
        ArtifactMetadata {
            description: "Moves GPS maps, locations, and steps data.".into(),
            tags: vec!["GPS".into(), "Moves".into(), "steps".into()],
            updated_at: Utc.with_ymd_and_hms(2016, 6, 24, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn list_maps_member_files() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{BASE}{EXCHANGE_MEMBER}?access_token=hub-tok"),
            json!({
                "project_member_id": "12345678",
                "data": [
                    {
                        "id": 7,
                        "basename": "moves-storyline-data.json",
                        "download_url": "https://files.test/7",
                        "metadata": {"tags": ["GPS", "Moves", "steps"], "description": "x"}
                    },
                    {"id": 8, "basename": "notes.txt", "download_url": "https://files.test/8"}
                ]
            }),
        );

        let files = client(&transport).list("hub-tok", "12345678").await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].id, Some(7));
        assert!(files[0].has_tag("Moves"));
        assert!(files[1].tags.is_empty());
    }

    #[tokio::test]
    async fn list_maps_auth_failures() {
        let transport = MockTransport::new();
        transport.push_status(
            HttpMethod::Get,
            format!("{BASE}{EXCHANGE_MEMBER}?access_token=bad"),
            401,
            "invalid token",
        );

        let err = client(&transport).list("bad", "1").await.expect_err("401");
        assert!(matches!(err, ArtifactError::Unauthorized));
    }

    #[tokio::test]
    async fn download_returns_raw_body() {
        let transport = MockTransport::new();
        transport.push_status(HttpMethod::Get, "https://files.test/7", 200, "[1,2]");

        let info = ArtifactInfo {
            id: Some(7),
            basename: "moves-storyline-data.json".into(),
            download_url: "https://files.test/7".into(),
            tags: vec![],
        };
        let body = client(&transport).download(&info).await.unwrap();
        assert_eq!(body, b"[1,2]".to_vec());
    }

    #[tokio::test]
    async fn delete_posts_basename_and_tolerates_missing_file() {
        let transport = MockTransport::new();
        let url = format!("{BASE}{DELETE_FILE}?access_token=hub-tok");
        transport.push_status(HttpMethod::Post, url.clone(), 200, "");
        transport.push_status(HttpMethod::Post, url.clone(), 404, "");
        let hub = client(&transport);

        hub.delete("hub-tok", "1", "moves-storyline-data.json")
            .await
            .unwrap();
        hub.delete("hub-tok", "1", "moves-storyline-data.json")
            .await
            .unwrap();

        let sent: serde_json::Value =
            serde_json::from_slice(&transport.requests()[0].body).unwrap();
        assert_eq!(
            sent,
            json!({"project_member_id": "1", "file_basename": "moves-storyline-data.json"})
        );
    }

    #[tokio::test]
    async fn delete_surfaces_server_errors() {
        let transport = MockTransport::new();
        transport.push_status(
            HttpMethod::Post,
            format!("{BASE}{DELETE_FILE}?access_token=hub-tok"),
            500,
            "oops",
        );

        let err = client(&transport)
            .delete("hub-tok", "1", "f.json")
            .await
            .expect_err("500");
        assert!(matches!(err, ArtifactError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn upload_runs_direct_put_complete() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Post,
            format!("{BASE}{UPLOAD_DIRECT}?access_token=hub-tok"),
            json!({"id": 99, "url": "https://s3.test/presigned"}),
        );
        transport.push_status(HttpMethod::Put, "https://s3.test/presigned", 200, "");
        transport.push_status(
            HttpMethod::Post,
            format!("{BASE}{UPLOAD_COMPLETE}?access_token=hub-tok"),
            200,
            "",
        );

        client(&transport)
            .upload(
                "hub-tok",
                "1",
                "moves-storyline-data.json",
                b"[]".to_vec(),
                &metadata(),
            )
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);

        let direct: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(direct["filename"], "moves-storyline-data.json");
        assert_eq!(direct["metadata"]["tags"], json!(["GPS", "Moves", "steps"]));

        assert_eq!(requests[1].body, b"[]".to_vec());

        let complete: serde_json::Value = serde_json::from_slice(&requests[2].body).unwrap();
        assert_eq!(complete, json!({"project_member_id": "1", "file_id": 99}));
    }

    #[tokio::test]
    async fn upload_stops_when_put_fails() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Post,
            format!("{BASE}{UPLOAD_DIRECT}?access_token=hub-tok"),
            json!({"id": 99, "url": "https://s3.test/presigned"}),
        );
        transport.push_status(HttpMethod::Put, "https://s3.test/presigned", 403, "expired");

        let err = client(&transport)
            .upload("hub-tok", "1", "f.json", b"[]".to_vec(), &metadata())
            .await
            .expect_err("put fails");
        assert!(matches!(err, ArtifactError::Unauthorized));
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn token_url_uses_base() {
        let hub = client(&MockTransport::new());
        assert_eq!(hub.token_url(), "https://hub.test/oauth2/token/");
    }
}
