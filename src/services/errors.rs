use thiserror::Error;

use crate::db;

/// Failure kinds shared by every command and query. Only the HTTP adapter maps them.
#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvariantViolation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    DependencyFailure(String),
    #[error("{0}")]
    Timeout(String),
}

impl ServiceError {
    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_error",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::Conflict(_) => "conflict",
            Self::DependencyFailure(_) => "dependency_failure",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Maps a database error, logging anything that is not a constraint hit.
    pub(crate) fn database(err: sqlx::Error, context: &str) -> Self {
        if db::is_unique_violation(&err) {
            return Self::Conflict(format!("{context}: duplicate entry"));
        }
        if db::is_foreign_key_violation(&err) {
            return Self::NotFound(format!("{context}: referenced entity not found"));
        }
        tracing::error!(error = %err, "{context}");
        Self::DependencyFailure(context.to_string())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::database(err, "Database operation failed")
    }
}
