use sea_orm::DbErr;
use thiserror::Error;

use crate::entity::source_kind::SourceKind;

/// Errors from the member and link store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sea-orm.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Not found: {context}")]
    NotFound { context: String },
}

impl StoreError {
    pub fn member_not_found(member_id: &str) -> Self {
        Self::NotFound {
            context: format!("member {}", member_id),
        }
    }

    pub fn link_not_found(member_id: &str, source: SourceKind) -> Self {
        Self::NotFound {
            context: format!("{} link for member {}", source, member_id),
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
