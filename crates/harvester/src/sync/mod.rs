//! The incremental sync core.
//!
//! # Module Structure
//!
//! - [`engine`] - resume point, partial-window eviction, forward pagination
//! - [`loader`] - fetch and parse the previously published artifact
//! - [`publish`] - delete-then-upload replacement of the artifact
//! - `progress` - `SyncProgress`, `ProgressCallback`, `emit()`
//! - `types` - `SyncOptions`, `EngineReport`, constants

pub mod engine;
pub mod loader;
mod progress;
pub mod publish;
mod types;

pub use engine::{SyncRequest, sync_dataset};
pub use loader::{Existing, LoadError, find_artifact, load_existing};
pub use progress::{ProgressCallback, SyncProgress, emit};
pub use publish::{PublishError, Published, publish};
pub use types::{EngineReport, StopReason, SyncOptions};

pub use types::{
    DEFAULT_MAX_PAGES, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_TRANSIENT_RETRIES,
    RATE_LIMIT_RETRY_SECS, STALE_AFTER_DAYS,
};
