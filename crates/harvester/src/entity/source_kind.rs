//! Source kind enum for type-safe handling of linked data providers.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Supported third-party data sources.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Moves activity tracker (storyline with GPS track points)
    #[sea_orm(string_value = "moves")]
    Moves,
    /// RescueTime productivity tracker
    #[sea_orm(string_value = "rescuetime")]
    RescueTime,
}

impl SourceKind {
    /// Stable lowercase name, used in config sections, realms and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Moves => "moves",
            SourceKind::RescueTime => "rescuetime",
        }
    }

    /// All known sources.
    pub fn all() -> [SourceKind; 2] {
        [SourceKind::Moves, SourceKind::RescueTime]
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "moves" => Ok(SourceKind::Moves),
            "rescuetime" | "rescue-time" => Ok(SourceKind::RescueTime),
            _ => Err(format!("Unknown source: {}", s)),
        }
    }
}
