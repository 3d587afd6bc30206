//! Realm-scoped rate limiting for source API calls.
//!
//! Every outbound source call is attributed to a *realm*, a named bucket
//! sharing one quota. The limiter is an injected capability: one
//! [`RealmRateLimiter`] is built at startup and cloned into every fetcher, so
//! concurrent runs for different members draw from the same budget.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::state::{InMemoryState, NotKeyed};
use governor::{NotUntil, Quota, RateLimiter};
use thiserror::Error;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;
type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Default quotas for the built-in realms.
pub mod quotas {
    /// Moves allows 60 requests per minute per client.
    pub const MOVES_PER_MINUTE: u32 = 60;
    /// RescueTime does not publish a limit; stay conservative.
    pub const RESCUETIME_PER_MINUTE: u32 = 30;
    /// Quota applied to realms nobody registered.
    pub const FALLBACK_PER_MINUTE: u32 = 60;
}

/// The limiter refused a call because the realm's budget is spent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rate limit exhausted for realm '{realm}' (retry in {retry_after:?})")]
pub struct Rejected {
    pub realm: String,
    /// Earliest point at which a single call would be admitted again.
    pub retry_after: Duration,
}

/// Gate for outbound calls, keyed by realm.
#[async_trait]
pub trait RealmLimiter: Send + Sync {
    /// Take one unit of budget from `realm` without waiting.
    fn check(&self, realm: &str) -> Result<(), Rejected>;

    /// Wait until `realm` has budget, then take one unit.
    async fn acquire(&self, realm: &str);
}

/// A request budget: at most `max_requests` per `period`, refilled evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealmQuota {
    pub max_requests: u32,
    pub period: Duration,
}

impl RealmQuota {
    #[must_use]
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            period: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn per_hour(max_requests: u32) -> Self {
        Self {
            max_requests,
            period: Duration::from_secs(3600),
        }
    }

    #[must_use]
    pub fn new(max_requests: u32, period: Duration) -> Self {
        Self {
            max_requests,
            period,
        }
    }

    /// Convert into a governor quota whose burst equals `max_requests`.
    fn to_quota(self) -> Quota {
        let burst = NonZeroU32::new(self.max_requests).unwrap_or(NonZeroU32::MIN);
        match Quota::with_period(self.period / burst.get()) {
            Some(quota) => quota.allow_burst(burst),
            // A zero period means "no practical limit".
            None => Quota::per_second(NonZeroU32::MAX),
        }
    }
}

impl Default for RealmQuota {
    fn default() -> Self {
        Self::per_minute(quotas::FALLBACK_PER_MINUTE)
    }
}

/// `governor`-backed [`RealmLimiter`].
///
/// Registered realms get their own limiter with their own quota. Any other
/// realm falls back to a keyed limiter sharing the default quota shape, so an
/// unregistered realm is still limited independently of its neighbours.
#[derive(Clone)]
pub struct RealmRateLimiter {
    realms: Arc<HashMap<String, Arc<DirectLimiter>>>,
    fallback: Arc<KeyedLimiter>,
}

impl RealmRateLimiter {
    pub fn builder() -> RealmRateLimiterBuilder {
        RealmRateLimiterBuilder::default()
    }

    /// Names of the realms with a dedicated quota.
    pub fn realms(&self) -> impl Iterator<Item = &str> {
        self.realms.keys().map(String::as_str)
    }

    fn rejected(realm: &str, not_until: &NotUntil<<DefaultClock as Clock>::Instant>) -> Rejected {
        let now = DefaultClock::default().now();
        Rejected {
            realm: realm.to_string(),
            retry_after: not_until.wait_time_from(now),
        }
    }
}

impl Default for RealmRateLimiter {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[async_trait]
impl RealmLimiter for RealmRateLimiter {
    fn check(&self, realm: &str) -> Result<(), Rejected> {
        let result = match self.realms.get(realm) {
            Some(limiter) => limiter.check(),
            None => self.fallback.check_key(&realm.to_string()),
        };
        result.map_err(|not_until| Self::rejected(realm, &not_until))
    }

    async fn acquire(&self, realm: &str) {
        match self.realms.get(realm) {
            Some(limiter) => limiter.until_ready().await,
            None => self.fallback.until_key_ready(&realm.to_string()).await,
        }
    }
}

/// Builder for [`RealmRateLimiter`].
#[derive(Debug, Default)]
pub struct RealmRateLimiterBuilder {
    realms: HashMap<String, RealmQuota>,
    default_quota: Option<RealmQuota>,
}

impl RealmRateLimiterBuilder {
    /// Give `realm` its own quota. Registering a realm twice keeps the last quota.
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>, quota: RealmQuota) -> Self {
        self.realms.insert(realm.into(), quota);
        self
    }

    /// Quota used for realms that were not registered.
    #[must_use]
    pub fn default_quota(mut self, quota: RealmQuota) -> Self {
        self.default_quota = Some(quota);
        self
    }

    pub fn build(self) -> RealmRateLimiter {
        let realms = self
            .realms
            .into_iter()
            .map(|(name, quota)| (name, Arc::new(RateLimiter::direct(quota.to_quota()))))
            .collect();
        let fallback = RateLimiter::keyed(self.default_quota.unwrap_or_default().to_quota());

        RealmRateLimiter {
            realms: Arc::new(realms),
            fallback: Arc::new(fallback),
        }
    }
}
