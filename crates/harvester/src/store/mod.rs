//! Persistence for hub members and their source links.
//!
//! Query functions take a `&DatabaseConnection` and return [`StoreError`].
//! The sync task only needs to record completed runs, which it does through
//! the [`Bookkeeping`] trait so tests can swap in an in-memory recorder.

mod errors;
mod links;
mod members;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use crate::entity::source_kind::SourceKind;

pub use errors::{Result, StoreError};
pub use links::{
    NewLink, delete_link, find_link, find_stale_links, list_links, mark_synced,
    update_link_tokens, upsert_link,
};
pub use members::{find_member, list_members, update_member_tokens, upsert_member};

/// Records the outcome of sync runs.
#[async_trait]
pub trait Bookkeeping: Send + Sync {
    /// A run for `member`/`source` caught up with the source at `at`.
    async fn mark_synced(&self, member: &str, source: SourceKind, at: DateTime<Utc>)
    -> Result<()>;
}

#[async_trait]
impl Bookkeeping for DatabaseConnection {
    async fn mark_synced(
        &self,
        member: &str,
        source: SourceKind,
        at: DateTime<Utc>,
    ) -> Result<()> {
        links::mark_synced(self, member, source, at).await
    }
}
