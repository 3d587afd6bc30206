//! Fakes shared by the orchestrator and queue tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};

use super::{SyncJob, SyncTask};
use crate::artifact::memory::MemoryArtifactStore;
use crate::credentials::{AuthError, CredentialStore};
use crate::fetch::Fetcher;
use crate::http::{HttpMethod, MockTransport};
use crate::rate_limit::{RealmQuota, RealmRateLimiter};
use crate::retry::RetryConfig;
use crate::source::{DataSource, RescueTime, SourceKind, SourceRegistry};
use crate::store::{Bookkeeping, StoreError};
use crate::sync::{ProgressCallback, SyncProgress};

pub const MEMBER: &str = "m-1";
pub const HUB_TOKEN: &str = "hub-token";
pub const SOURCE_TOKEN: &str = "rt-token";
pub const API_URL: &str = "http://rescuetime.test/data";

/// Tokens held in memory; members without a hub token are unknown.
#[derive(Default)]
pub struct StaticCredentials {
    hub: HashMap<String, String>,
    sources: HashMap<(String, SourceKind), String>,
}

impl StaticCredentials {
    pub fn with_member(mut self, member: &str, hub: &str) -> Self {
        self.hub.insert(member.to_string(), hub.to_string());
        self
    }

    pub fn with_link(mut self, member: &str, source: SourceKind, token: &str) -> Self {
        self.sources
            .insert((member.to_string(), source), token.to_string());
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn hub_token(&self, member: &str) -> Result<String, AuthError> {
        self.hub
            .get(member)
            .cloned()
            .ok_or_else(|| AuthError::UnknownMember {
                member: member.to_string(),
            })
    }

    async fn source_token(&self, member: &str, source: SourceKind) -> Result<String, AuthError> {
        self.sources
            .get(&(member.to_string(), source))
            .cloned()
            .ok_or_else(|| AuthError::NotLinked {
                member: member.to_string(),
                kind: source,
            })
    }
}

/// Records every `mark_synced` call.
#[derive(Default)]
pub struct RecordingBookkeeping {
    synced: Mutex<Vec<(String, SourceKind, DateTime<Utc>)>>,
}

impl RecordingBookkeeping {
    pub fn synced(&self) -> Vec<(String, SourceKind, DateTime<Utc>)> {
        self.synced.lock().unwrap().clone()
    }
}

#[async_trait]
impl Bookkeeping for RecordingBookkeeping {
    async fn mark_synced(
        &self,
        member: &str,
        source: SourceKind,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.synced
            .lock()
            .unwrap()
            .push((member.to_string(), source, at));
        Ok(())
    }
}

/// A RescueTime source whose history starts three days before today, so one
/// fourteen-day window catches up.
pub fn recent_rescuetime() -> RescueTime {
    RescueTime::default()
        .with_api_url(API_URL)
        .with_first_date(first_date())
}

pub fn first_date() -> NaiveDate {
    Utc::now().date_naive() - chrono::Duration::days(3)
}

/// URL of the single page a fresh run requests.
pub fn page_url() -> String {
    recent_rescuetime().page_url(first_date(), SOURCE_TOKEN)
}

/// A table page with one row on `first_date()`.
pub fn table_page(hour: u32) -> Value {
    json!({
        "row_headers": ["Date", "Time Spent (seconds)", "Activity"],
        "rows": [[format!("{}T{:02}:00:00", first_date(), hour), 120, "editor"]]
    })
}

pub struct Harness {
    pub transport: MockTransport,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub bookkeeping: Arc<RecordingBookkeeping>,
    pub events: Arc<Mutex<Vec<SyncProgress>>>,
    pub task: SyncTask,
}

impl Harness {
    pub fn job() -> SyncJob {
        SyncJob::new(MEMBER, SourceKind::RescueTime)
    }

    pub fn push_page(&self, body: Value) {
        self.transport.push_json(HttpMethod::Get, page_url(), body);
    }

    pub fn push_rate_limited(&self, retry_after_secs: Option<u64>) {
        let headers = retry_after_secs
            .map(|s| vec![("Retry-After".to_string(), s.to_string())])
            .unwrap_or_default();
        self.transport.push_response(
            HttpMethod::Get,
            page_url(),
            crate::http::HttpResponse {
                status: 429,
                headers,
                body: Vec::new(),
            },
        );
    }
}

pub fn harness() -> Harness {
    harness_with(
        StaticCredentials::default()
            .with_member(MEMBER, HUB_TOKEN)
            .with_link(MEMBER, SourceKind::RescueTime, SOURCE_TOKEN),
    )
}

pub fn harness_with(credentials: StaticCredentials) -> Harness {
    let transport = MockTransport::new();
    let limiter = RealmRateLimiter::builder()
        .default_quota(RealmQuota::new(1000, Duration::from_secs(1)))
        .build();
    let fetcher = Fetcher::new(Arc::new(transport.clone()), Arc::new(limiter))
        .with_retry(RetryConfig::disabled());
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let bookkeeping = Arc::new(RecordingBookkeeping::default());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let on_progress: ProgressCallback = Box::new(move |event| {
        sink.lock().unwrap().push(event);
    });

    let task = SyncTask::builder()
        .credentials(Arc::new(credentials))
        .artifacts(artifacts.clone())
        .fetcher(fetcher)
        .sources(SourceRegistry::new().with(Arc::new(recent_rescuetime())))
        .bookkeeping(bookkeeping.clone())
        .progress(Arc::new(on_progress))
        .build()
        .expect("harness task should build");

    Harness {
        transport,
        artifacts,
        bookkeeping,
        events,
        task,
    }
}
