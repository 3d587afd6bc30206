//! SeaORM entity definitions for the harvester database schema.

pub mod hub_member;
pub mod prelude;
pub mod source_kind;
pub mod source_link;
