use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::credentials::TokenSet;
use crate::entity::source_kind::SourceKind;
use crate::entity::source_link::{ActiveModel, Column, Entity as SourceLink, Model};

use super::errors::{Result, StoreError};

/// A link to create or re-authorize.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub member_id: String,
    pub source: SourceKind,
    pub tokens: TokenSet,
}

/// Find the link between a member and a source.
pub async fn find_link(
    db: &DatabaseConnection,
    member_id: &str,
    source: SourceKind,
) -> Result<Option<Model>> {
    SourceLink::find()
        .filter(Column::MemberId.eq(member_id))
        .filter(Column::Source.eq(source))
        .one(db)
        .await
        .map_err(StoreError::from)
}

/// Every link, ordered by member then source.
pub async fn list_links(db: &DatabaseConnection) -> Result<Vec<Model>> {
    SourceLink::find()
        .order_by_asc(Column::MemberId)
        .order_by_asc(Column::Source)
        .all(db)
        .await
        .map_err(StoreError::from)
}

/// Links never synced, or last synced before `cutoff`.
pub async fn find_stale_links(
    db: &DatabaseConnection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Model>> {
    SourceLink::find()
        .filter(
            Condition::any()
                .add(Column::LastSyncedAt.is_null())
                .add(Column::LastSyncedAt.lt(cutoff.fixed_offset())),
        )
        .order_by_asc(Column::LastSyncedAt)
        .order_by_asc(Column::MemberId)
        .all(db)
        .await
        .map_err(StoreError::from)
}

/// Create a link, or replace the tokens of an existing one.
///
/// Re-linking keeps `last_synced_at`, so the scheduler does not treat a
/// re-authorized link as new.
pub async fn upsert_link(db: &DatabaseConnection, link: NewLink) -> Result<Model> {
    match find_link(db, &link.member_id, link.source).await? {
        Some(existing) => {
            let mut model = existing.into_active_model();
            model.access_token = Set(link.tokens.access_token);
            model.refresh_token = Set(link.tokens.refresh_token);
            model.token_expires_at = Set(link.tokens.expires_at.map(|t| t.fixed_offset()));
            model.update(db).await.map_err(StoreError::from)
        }
        None => ActiveModel {
            id: Set(Uuid::new_v4()),
            member_id: Set(link.member_id),
            source: Set(link.source),
            access_token: Set(link.tokens.access_token),
            refresh_token: Set(link.tokens.refresh_token),
            token_expires_at: Set(link.tokens.expires_at.map(|t| t.fixed_offset())),
            last_synced_at: Set(None),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(db)
        .await
        .map_err(StoreError::from),
    }
}

async fn require_link(
    db: &DatabaseConnection,
    member_id: &str,
    source: SourceKind,
) -> Result<Model> {
    find_link(db, member_id, source)
        .await?
        .ok_or_else(|| StoreError::link_not_found(member_id, source))
}

/// Record a completed sync.
pub async fn mark_synced(
    db: &DatabaseConnection,
    member_id: &str,
    source: SourceKind,
    at: DateTime<Utc>,
) -> Result<()> {
    let mut model = require_link(db, member_id, source)
        .await?
        .into_active_model();
    model.last_synced_at = Set(Some(at.fixed_offset()));
    model.update(db).await?;
    Ok(())
}

/// Store refreshed source tokens. A missing refresh token keeps the old one.
pub async fn update_link_tokens(
    db: &DatabaseConnection,
    member_id: &str,
    source: SourceKind,
    tokens: &TokenSet,
) -> Result<Model> {
    let mut model = require_link(db, member_id, source)
        .await?
        .into_active_model();
    model.access_token = Set(tokens.access_token.clone());
    if tokens.refresh_token.is_some() {
        model.refresh_token = Set(tokens.refresh_token.clone());
    }
    model.token_expires_at = Set(tokens.expires_at.map(|t| t.fixed_offset()));
    model.update(db).await.map_err(StoreError::from)
}

/// Remove a link. Returns the number of rows deleted (0 or 1).
pub async fn delete_link(
    db: &DatabaseConnection,
    member_id: &str,
    source: SourceKind,
) -> Result<u64> {
    let result = SourceLink::delete_many()
        .filter(Column::MemberId.eq(member_id))
        .filter(Column::Source.eq(source))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
