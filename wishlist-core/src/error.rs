//! Error taxonomy of the consistency core.
//!
//! Rule violations are reported as typed [`CoreError`] variants so that the
//! HTTP layer can map them to status codes without string matching.

use crate::tokens::TokenError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The list exists but is still a draft.
    #[error("wishlist is not published yet")]
    NotPublished,

    /// The action lost a race or is not allowed in the current state.
    #[error("{0}")]
    Conflict(&'static str),

    /// Missing, expired or foreign guest/owner token.
    #[error("{0}")]
    Auth(String),

    /// Authenticated, but not allowed to touch this resource.
    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::Store(StoreError::Database(e))
    }
}

impl From<TokenError> for CoreError {
    fn from(e: TokenError) -> Self {
        CoreError::Auth(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A persisted row could not be interpreted.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}
