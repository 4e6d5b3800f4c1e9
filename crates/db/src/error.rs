//! Typed error type for the db crate.

use engine::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("duplicate row: {0}")]
    Duplicate(String),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("json column error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A version number that does not fit the `INTEGER` column, or a stored
    /// value that is not a valid version.
    #[error("version {0} is out of range")]
    VersionOutOfRange(i64),

    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

impl DbError {
    /// Classify a failed insert: unique-key violations become
    /// [`DbError::Duplicate`].
    pub(crate) fn from_insert(err: sqlx::Error, what: impl FnOnce() -> String) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Duplicate(what()),
            _ => Self::Sqlx(err),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Duplicate(what) => StoreError::Duplicate(what),
            DbError::Serialization(_) | DbError::VersionOutOfRange(_) | DbError::InvalidValue(_) => {
                StoreError::Serialization(err.to_string())
            }
            DbError::Sqlx(_) | DbError::NotFound | DbError::Migration(_) => {
                StoreError::Backend(err.to_string())
            }
        }
    }
}
