//! Rate-limited fetcher for source APIs.
//!
//! Every GET is attributed to a realm and gated by the shared
//! [`RealmLimiter`]. By default an exhausted realm fails the call at once
//! with [`FetchError::RateLimited`]; callers that can afford to block (the
//! one-time profile lookup) ask for [`WaitPolicy::WaitForQuota`] instead.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::http::{HttpError, HttpRequest, HttpTransport, retry_after};
use crate::rate_limit::RealmLimiter;
use crate::retry::{RetryConfig, with_retry};

/// What to do when a realm's budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Fail immediately with [`FetchError::RateLimited`].
    #[default]
    FailFast,
    /// Block until the limiter admits the call.
    WaitForQuota,
}

/// Errors from a single source API call.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The local limiter refused the call, or the source answered 429.
    #[error("rate limited on realm '{realm}'")]
    RateLimited {
        realm: String,
        retry_after: Option<Duration>,
    },

    /// Network-level failure, no usable response.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The source answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The body was not valid JSON.
    #[error("invalid JSON body: {message}")]
    Decode { message: String },
}

impl FetchError {
    #[inline]
    pub fn rate_limited(realm: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            realm: realm.into(),
            retry_after,
        }
    }

    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    #[inline]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Failures worth retrying in place: network errors and 5xx responses.
    #[inline]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<HttpError> for FetchError {
    fn from(err: HttpError) -> Self {
        Self::transport(err.to_string())
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, so multi-line response bodies
/// don't flood progress output.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Longest response body excerpt kept in error messages.
pub const MAX_ERROR_BODY: usize = 200;

/// Cut a response body down to [`MAX_ERROR_BODY`] bytes on a char boundary.
pub(crate) fn truncate_body(mut message: String) -> String {
    if message.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}

/// Issues rate-limited GETs against source APIs.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<dyn RealmLimiter>,
    retry: RetryConfig,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, limiter: Arc<dyn RealmLimiter>) -> Self {
        Self {
            transport,
            limiter,
            retry: RetryConfig::default(),
        }
    }

    /// Replace the transient-failure retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// GET `url` on behalf of `realm` and parse the body as JSON.
    ///
    /// Each attempt, retries included, spends one unit of the realm's budget.
    pub async fn get_json(
        &self,
        url: &str,
        realm: &str,
        wait: WaitPolicy,
    ) -> Result<serde_json::Value, FetchError> {
        with_retry(
            || self.attempt(url, realm, wait),
            self.retry.clone(),
            FetchError::is_transient,
            |e: &FetchError| short_error_message(e),
            realm,
        )
        .await
    }

    async fn attempt(
        &self,
        url: &str,
        realm: &str,
        wait: WaitPolicy,
    ) -> Result<serde_json::Value, FetchError> {
        match wait {
            WaitPolicy::FailFast => {
                if let Err(rejected) = self.limiter.check(realm) {
                    tracing::debug!(realm, retry_after = ?rejected.retry_after, "Limiter rejected call");
                    return Err(FetchError::rate_limited(realm, Some(rejected.retry_after)));
                }
            }
            WaitPolicy::WaitForQuota => self.limiter.acquire(realm).await,
        }

        let response = self.transport.send(HttpRequest::get(url)).await?;

        if response.status == 429 {
            return Err(FetchError::rate_limited(
                realm,
                retry_after(&response.headers),
            ));
        }

        if !response.is_success() {
            return Err(FetchError::status(
                response.status,
                truncate_body(response.text()),
            ));
        }

        serde_json::from_slice(&response.body).map_err(|e| FetchError::decode(e.to_string()))
    }
}
