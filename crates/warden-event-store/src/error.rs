//! Mapping of driver errors into the domain taxonomy.

use warden_core::error::DomainError;

/// Wraps a driver error as `DomainError::Internal`, keeping `context` in the
/// message.
pub(crate) fn internal(context: &str, err: &sqlx::Error) -> DomainError {
    DomainError::Internal(format!("{context}: {err}"))
}

/// Like [`internal`], but unique-key violations become
/// `DomainError::AlreadyExists`.
pub(crate) fn on_insert(context: &str, err: &sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DomainError::AlreadyExists(format!("{context}: {db}"))
        }
        other => internal(context, other),
    }
}
