//! Hub member entity - one account on the data-sharing hub.
//!
//! The member id is the hub's stable project-member identifier. Hub tokens
//! are stored alongside so sync runs can list, delete and upload files on
//! the member's behalf.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "hub_members")]
pub struct Model {
    /// Hub project-member id.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub access_token: String,

    pub refresh_token: String,

    /// When `access_token` stops being valid.
    pub token_expires_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_expires_at", &self.token_expires_at)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// A member has many source links.
    #[sea_orm(has_many = "super::source_link::Entity")]
    SourceLinks,
}

impl Related<super::source_link::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SourceLinks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
