//! Source link entity - a member's authorization for one data source.
//!
//! Carries the source's OAuth tokens and the sync bookkeeping timestamp the
//! scheduler uses to decide whether a refresh is due.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::entity::source_kind::SourceKind;

#[derive(Clone, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "source_links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning hub member.
    pub member_id: String,

    pub source: SourceKind,

    pub access_token: String,

    pub refresh_token: Option<String>,

    pub token_expires_at: Option<DateTimeWithTimeZone>,

    /// Last run that caught up with the source. `None` until the first one.
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.id)
            .field("member_id", &self.member_id)
            .field("source", &self.source)
            .field("access_token", &"<redacted>")
            .field("token_expires_at", &self.token_expires_at)
            .field("last_synced_at", &self.last_synced_at)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::hub_member::Entity",
        from = "Column::MemberId",
        to = "super::hub_member::Column::Id",
        on_delete = "Cascade"
    )]
    HubMember,
}

impl Related<super::hub_member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HubMember.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
