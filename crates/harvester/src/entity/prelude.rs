//! Common re-exports for convenient entity usage.

pub use super::hub_member::{
    ActiveModel as HubMemberActiveModel, Column as HubMemberColumn, Entity as HubMember,
    Model as HubMemberModel,
};
pub use super::source_kind::SourceKind;
pub use super::source_link::{
    ActiveModel as SourceLinkActiveModel, Column as SourceLinkColumn, Entity as SourceLink,
    Model as SourceLinkModel,
};
