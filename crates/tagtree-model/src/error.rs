//! Error types for the tag taxonomy.

use thiserror::Error;

/// Errors surfaced by every layer of the tag taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagsError {
    /// Lookup by id, remote id, url path or keyword/parent yielded nothing.
    #[error("Could not find '{what}' with identifier '{identifier}'")]
    NotFound { what: String, identifier: String },

    /// Rejected before any mutation was issued.
    #[error("Argument '{argument}' is invalid: {reason}")]
    InvalidArgument { argument: String, reason: String },

    /// Duplicate remote id, unregistered language code and similar.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TagsError {
    pub fn not_found(what: impl Into<String>, identifier: impl ToString) -> Self {
        Self::NotFound {
            what: what.into(),
            identifier: identifier.to_string(),
        }
    }

    pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an invalid argument error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Check if this is a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }
}

/// Result type for tag operations.
pub type TagsResult<T> = Result<T, TagsError>;
