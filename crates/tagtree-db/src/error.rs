//! Database error types.

use tagtree_model::TagsError;
use thiserror::Error;

/// Database operation errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// Row not found.
    #[error("Row not found")]
    NotFound,

    /// Unique constraint violation.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Foreign key violation.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Migration error.
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    /// SQLx error.
    #[error("Database error: {0}")]
    SqlxError(sqlx::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::DuplicateKey(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                Self::ForeignKeyViolation(db.message().to_string())
            }
            other => Self::SqlxError(other),
        }
    }
}

impl From<DbError> for TagsError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => TagsError::not_found("row", "unknown"),
            DbError::DuplicateKey(message) | DbError::ForeignKeyViolation(message) => {
                TagsError::ConstraintViolation(message)
            }
            other => TagsError::Storage(other.to_string()),
        }
    }
}

/// Map a driver error straight into the domain taxonomy.
pub(crate) fn db_err(err: sqlx::Error) -> TagsError {
    DbError::from(err).into()
}
