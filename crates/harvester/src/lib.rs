//! Harvester - incremental personal-data sync into a data-sharing hub.
//!
//! For each member and linked source, a sync run loads the member's
//! previously published artifact, drops its possibly incomplete trailing
//! window, pages forward through the source API in fixed windows under a
//! shared per-realm rate limit, and replaces the artifact with the merged
//! result.
//!
//! # Features
//!
//! - `sqlite` (default) / `postgres` - database backends.
//! - `migrate` (default) - enables [`connect_and_migrate`].
//! - `test-util` - exposes `http::MockTransport` and
//!   `artifact::MemoryArtifactStore` for integration tests.
//!
//! # Example
//!
//! ```ignore
//! use harvester::task::{QueueConfig, SyncJob, SyncTask, TaskQueue};
//!
//! let task = SyncTask::builder()
//!     .credentials(credentials)
//!     .artifacts(hub)
//!     .fetcher(fetcher)
//!     .bookkeeping(db.clone())
//!     .build()?;
//!
//! let queue = TaskQueue::start(task, QueueConfig::default());
//! harvester::scheduler::enqueue_stale(&db, &queue, stale_after, Utc::now()).await?;
//! queue.wait_idle().await;
//! ```

pub mod artifact;
pub mod credentials;
pub mod dataset;
pub mod db;
pub mod entity;
pub mod fetch;
pub mod http;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod sync;
pub mod task;

#[cfg(feature = "migrate")]
pub mod migration;

pub use artifact::{ArtifactError, ArtifactStore, HubClient};
pub use credentials::{AuthError, CredentialStore, DbCredentialStore, OAuthProvider};
pub use dataset::{Dataset, DatasetError, Layout};
pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use fetch::{FetchError, Fetcher, WaitPolicy};
pub use http::{HttpTransport, ReqwestTransport};
pub use rate_limit::{RealmLimiter, RealmQuota, RealmRateLimiter};
pub use source::{DataSource, SourceRegistry};
pub use store::StoreError;
pub use task::{RunOutcome, SyncJob, SyncTask, TaskError, TaskQueue};
