use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryOrder, Set};

use crate::credentials::TokenSet;
use crate::entity::hub_member::{ActiveModel, Column, Entity as HubMember, Model};

use super::errors::{Result, StoreError};

/// Find a hub member by id.
pub async fn find_member(db: &DatabaseConnection, member_id: &str) -> Result<Option<Model>> {
    HubMember::find_by_id(member_id.to_string())
        .one(db)
        .await
        .map_err(StoreError::from)
}

/// All hub members, ordered by id.
pub async fn list_members(db: &DatabaseConnection) -> Result<Vec<Model>> {
    HubMember::find()
        .order_by_asc(Column::Id)
        .all(db)
        .await
        .map_err(StoreError::from)
}

/// Insert a member, or replace the tokens of an existing one.
pub async fn upsert_member(
    db: &DatabaseConnection,
    member_id: &str,
    access_token: &str,
    refresh_token: &str,
    expires_at: DateTime<Utc>,
) -> Result<Model> {
    match find_member(db, member_id).await? {
        Some(existing) => {
            let mut model = existing.into_active_model();
            model.access_token = Set(access_token.to_string());
            model.refresh_token = Set(refresh_token.to_string());
            model.token_expires_at = Set(expires_at.fixed_offset());
            model.update(db).await.map_err(StoreError::from)
        }
        None => ActiveModel {
            id: Set(member_id.to_string()),
            access_token: Set(access_token.to_string()),
            refresh_token: Set(refresh_token.to_string()),
            token_expires_at: Set(expires_at.fixed_offset()),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(db)
        .await
        .map_err(StoreError::from),
    }
}

/// Store refreshed hub tokens. A missing refresh token keeps the old one.
pub async fn update_member_tokens(
    db: &DatabaseConnection,
    member_id: &str,
    tokens: &TokenSet,
) -> Result<Model> {
    let existing = find_member(db, member_id)
        .await?
        .ok_or_else(|| StoreError::member_not_found(member_id))?;

    let mut model = existing.into_active_model();
    model.access_token = Set(tokens.access_token.clone());
    if let Some(refresh) = &tokens.refresh_token {
        model.refresh_token = Set(refresh.clone());
    }
    if let Some(expires_at) = tokens.expires_at {
        model.token_expires_at = Set(expires_at.fixed_offset());
    }
    model.update(db).await.map_err(StoreError::from)
}
