//! Shared fixtures for the integration tests.
//!
//! Transport and hub fakes come from the library's `test-util` feature.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use harvester::credentials::{AuthError, CredentialStore};
use harvester::fetch::Fetcher;
use harvester::rate_limit::{RealmQuota, RealmRateLimiter};
use harvester::retry::RetryConfig;
use harvester::source::SourceKind;
use harvester::store::{Bookkeeping, StoreError};

pub use harvester::artifact::MemoryArtifactStore;
pub use harvester::http::{HttpMethod, MockTransport};

pub const MEMBER: &str = "member-1";
pub const HUB_TOKEN: &str = "hub-token";
pub const SOURCE_TOKEN: &str = "src-token";

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

/// Every member has the same tokens.
pub struct StaticCredentials;

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn hub_token(&self, _member: &str) -> Result<String, AuthError> {
        Ok(HUB_TOKEN.to_string())
    }

    async fn source_token(&self, _member: &str, _source: SourceKind) -> Result<String, AuthError> {
        Ok(SOURCE_TOKEN.to_string())
    }
}

#[derive(Default)]
pub struct RecordingBookkeeping {
    pub synced: Mutex<Vec<(String, SourceKind, DateTime<Utc>)>>,
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

/// A fetcher with a generous limiter and no transient retries.
pub fn fetcher(transport: &MockTransport) -> Fetcher {
    let limiter = RealmRateLimiter::builder()
        .default_quota(RealmQuota::new(10_000, Duration::from_secs(60)))
        .build();
    Fetcher::new(Arc::new(transport.clone()), Arc::new(limiter)).with_retry(RetryConfig::disabled())
}
