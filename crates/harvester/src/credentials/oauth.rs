//! OAuth2 token refresh over the [`HttpTransport`] boundary.
//!
//! Every provider the harvester talks to (the hub and both sources) accepts
//! the standard `refresh_token` grant with client credentials in the form
//! body, so one implementation covers them all.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::fetch::truncate_body;
use crate::http::{HttpError, HttpRequest, HttpTransport};

use super::{OAuthProvider, TokenSet};

/// Tokens expiring within this many seconds are refreshed before use.
pub const REFRESH_BUFFER_SECS: i64 = 300;

/// Errors from an OAuth token endpoint.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] HttpError),

    /// The provider refused the grant (revoked or unknown refresh token).
    #[error("{provider} rejected the token request ({status}): {message}")]
    Rejected {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Failed to parse token response: {0}")]
    Parse(String),
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub token_type: Option<String>,

    /// Lifetime of `access_token` in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,
}

impl AccessTokenResponse {
    /// Convert into a [`TokenSet`], resolving `expires_in` against `now`.
    #[must_use]
    pub fn into_token_set(self, now: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }
}

/// Check whether a token has expired or will within `buffer`.
///
/// `None` means the provider never told us, so the token is treated as
/// long-lived.
#[must_use]
pub fn token_is_expired(
    expires_at: Option<DateTime<Utc>>,
    buffer: Duration,
    now: DateTime<Utc>,
) -> bool {
    match expires_at {
        Some(exp) => now + buffer >= exp,
        None => false,
    }
}

/// Exchange a refresh token for a new token set.
#[tracing::instrument(skip_all, fields(provider = %provider.name))]
pub async fn refresh_access_token(
    transport: &dyn HttpTransport,
    provider: &OAuthProvider,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> Result<TokenSet, OAuthError> {
    let request = HttpRequest::post_form(
        provider.token_url.clone(),
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.as_str()),
        ],
    );

    let response = transport.send(request).await?;
    if !response.is_success() {
        return Err(OAuthError::Rejected {
            provider: provider.name.clone(),
            status: response.status,
            message: truncate_body(response.text()),
        });
    }

    let parsed: AccessTokenResponse =
        serde_json::from_slice(&response.body).map_err(|e| OAuthError::Parse(e.to_string()))?;
    tracing::debug!(expires_in = ?parsed.expires_in, "Refreshed access token");
    Ok(parsed.into_token_set(now))
}
