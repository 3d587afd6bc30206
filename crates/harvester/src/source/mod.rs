//! Data source definitions.
//!
//! A [`DataSource`] describes one provider's API without touching the
//! network: where its earliest data starts, how one window's URL is built,
//! how big a window is and what shape the accumulated dataset takes. The
//! sync engine drives any source through this trait.

pub mod moves;
pub mod rescuetime;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;

use crate::artifact::ArtifactSpec;
use crate::dataset::{Granularity, Layout, Window};
use crate::rate_limit::RealmQuota;

pub use crate::entity::source_kind::SourceKind;
pub use moves::Moves;
pub use rescuetime::RescueTime;

/// How the first window of an empty dataset is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPoint {
    /// Ask the source's profile endpoint for the account's first date.
    Profile { url: String },
    /// The source has no such endpoint; start from a fixed date.
    Fixed(NaiveDate),
}

/// One third-party provider.
pub trait DataSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Rate-limit realm shared by every call to this provider.
    fn realm(&self) -> &str {
        self.kind().as_str()
    }

    fn layout(&self) -> Layout;

    /// Unit in which the provider's data becomes complete.
    fn granularity(&self) -> Granularity;

    /// Span requested per page.
    fn window(&self) -> Window;

    /// Published file name, metadata and lookup tag.
    fn artifact(&self) -> &ArtifactSpec;

    fn start_point(&self, access_token: &str) -> StartPoint;

    /// Read the first available date out of a profile response.
    fn parse_profile(&self, _profile: &Value) -> Option<NaiveDate> {
        None
    }

    /// URL for the window starting at `start`.
    fn page_url(&self, start: NaiveDate, access_token: &str) -> String;

    /// Quota used when the realm is not configured explicitly.
    fn default_quota(&self) -> RealmQuota;
}

/// The set of enabled sources, keyed by kind.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<SourceKind, Arc<dyn DataSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Both built-in sources with their default settings.
    pub fn builtin() -> Self {
        Self::new()
            .with(Arc::new(Moves::default()))
            .with(Arc::new(RescueTime::default()))
    }

    #[must_use]
    pub fn with(mut self, source: Arc<dyn DataSource>) -> Self {
        self.sources.insert(source.kind(), source);
        self
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn DataSource>> {
        self.sources.get(&kind).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DataSource>> {
        self.sources.values()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.sources.keys()).finish()
    }
}
