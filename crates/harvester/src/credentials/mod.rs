//! Credential resolution for sync runs.
//!
//! A run needs two tokens: the member's hub token (to list, delete and upload
//! artifacts) and the member's token for the source being synced. Both are
//! stored in the database and refreshed through the provider's OAuth2 token
//! endpoint when they are about to expire.

pub mod oauth;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;
use thiserror::Error;

use crate::entity::source_kind::SourceKind;
use crate::http::HttpTransport;
use crate::store::{self, StoreError};

pub use oauth::{OAuthError, REFRESH_BUFFER_SECS, refresh_access_token, token_is_expired};

/// An access token with its refresh token and expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// An OAuth2 client registration at one provider.
#[derive(Clone)]
pub struct OAuthProvider {
    /// Display name used in logs and errors.
    pub name: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthProvider {
    pub fn new(
        name: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl std::fmt::Debug for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProvider")
            .field("name", &self.name)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Credential resolution failures. All of them end the run before publishing.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unknown hub member: {member}")]
    UnknownMember { member: String },

    #[error("Member {member} has not linked {kind}")]
    NotLinked { member: String, kind: SourceKind },

    #[error("Token for {kind} expired and member {member} has no refresh token")]
    NoRefreshToken { member: String, kind: SourceKind },

    #[error("No OAuth client configured for {0}")]
    NoProvider(SourceKind),

    #[error("Token refresh failed: {0}")]
    Refresh(#[from] OAuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Hands out valid access tokens for a member.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Token for the member's hub account.
    async fn hub_token(&self, member: &str) -> Result<String, AuthError>;

    /// Token for the member's account at `source`.
    async fn source_token(&self, member: &str, source: SourceKind) -> Result<String, AuthError>;
}

/// Database-backed [`CredentialStore`] that refreshes expiring tokens and
/// writes the new ones back.
#[derive(Clone)]
pub struct DbCredentialStore {
    db: Arc<DatabaseConnection>,
    transport: Arc<dyn HttpTransport>,
    hub: OAuthProvider,
    sources: HashMap<SourceKind, OAuthProvider>,
    refresh_buffer: Duration,
}

impl DbCredentialStore {
    pub fn new(
        db: Arc<DatabaseConnection>,
        transport: Arc<dyn HttpTransport>,
        hub: OAuthProvider,
    ) -> Self {
        Self {
            db,
            transport,
            hub,
            sources: HashMap::new(),
            refresh_buffer: Duration::seconds(REFRESH_BUFFER_SECS),
        }
    }

    /// Register the OAuth client used to refresh `source` tokens.
    #[must_use]
    pub fn with_source(mut self, source: SourceKind, provider: OAuthProvider) -> Self {
        self.sources.insert(source, provider);
        self
    }

    #[must_use]
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }
}

#[async_trait]
impl CredentialStore for DbCredentialStore {
    async fn hub_token(&self, member: &str) -> Result<String, AuthError> {
        let record = store::find_member(&self.db, member)
            .await?
            .ok_or_else(|| AuthError::UnknownMember {
                member: member.to_string(),
            })?;

        let now = Utc::now();
        let expires_at = record.token_expires_at.with_timezone(&Utc);
        if !token_is_expired(Some(expires_at), self.refresh_buffer, now) {
            return Ok(record.access_token);
        }

        tracing::info!(member, "Refreshing hub token");
        let tokens = refresh_access_token(
            self.transport.as_ref(),
            &self.hub,
            &record.refresh_token,
            now,
        )
        .await?;
        store::update_member_tokens(&self.db, member, &tokens).await?;
        Ok(tokens.access_token)
    }

    async fn source_token(&self, member: &str, source: SourceKind) -> Result<String, AuthError> {
        let link = store::find_link(&self.db, member, source)
            .await?
            .ok_or_else(|| AuthError::NotLinked {
                member: member.to_string(),
                kind: source,
            })?;

        let now = Utc::now();
        let expires_at = link.token_expires_at.map(|t| t.with_timezone(&Utc));
        if !token_is_expired(expires_at, self.refresh_buffer, now) {
            return Ok(link.access_token);
        }

        let refresh_token = link
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::NoRefreshToken {
                member: member.to_string(),
                kind: source,
            })?;
        let provider = self
            .sources
            .get(&source)
            .ok_or(AuthError::NoProvider(source))?;

        tracing::info!(member, source = %source, "Refreshing source token");
        let tokens =
            refresh_access_token(self.transport.as_ref(), provider, refresh_token, now).await?;
        store::update_link_tokens(&self.db, member, source, &tokens).await?;
        Ok(tokens.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_set_debug_redacts_secrets() {
        let tokens = TokenSet {
            access_token: "access-secret".to_string(),
            refresh_token: Some("refresh-secret".to_string()),
            expires_at: None,
        };
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("refresh-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn provider_debug_redacts_secret() {
        let provider = OAuthProvider::new("Hub", "https://hub.test/token", "id", "very-secret");
        let debug = format!("{:?}", provider);
        assert!(debug.contains("id"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn auth_error_messages() {
        let err = AuthError::NotLinked {
            member: "m-1".to_string(),
            kind: SourceKind::Moves,
        };
        assert_eq!(err.to_string(), "Member m-1 has not linked moves");
        assert_eq!(
            AuthError::NoProvider(SourceKind::RescueTime).to_string(),
            "No OAuth client configured for rescuetime"
        );
    }

    #[tokio::test]
    async fn cloned_stores_share_one_connection() {
        use sea_orm::{DatabaseBackend, MockDatabase};

        use crate::entity::hub_member;
        use crate::http::MockTransport;

        let now = Utc::now().fixed_offset();
        let member = hub_member::Model {
            id: "m-1".to_string(),
            access_token: "hub-access".to_string(),
            refresh_token: "hub-refresh".to_string(),
            token_expires_at: now + Duration::hours(2),
            created_at: now,
        };
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![member], Vec::new()])
            .into_connection();

        let store = DbCredentialStore::new(
            Arc::new(db),
            Arc::new(MockTransport::new()),
            OAuthProvider::new("Hub", "https://hub.test/token", "id", "secret"),
        );
        let copy = store.clone();

        assert_eq!(store.hub_token("m-1").await.unwrap(), "hub-access");
        // The second query result is consumed through the clone.
        assert!(matches!(
            copy.hub_token("m-1").await,
            Err(AuthError::UnknownMember { .. })
        ));
    }
}
