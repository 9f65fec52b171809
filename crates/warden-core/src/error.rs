//! Domain error types.

use thiserror::Error;

/// Top-level error type shared by the log, its repositories and the spooler.
///
/// The variants form the complete taxonomy callers can branch on: writers
/// retry on `AlreadyExists`, surface `PreconditionFailed` as a business rule
/// violation and treat `Internal` as an infrastructure fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Malformed input to a model constructor or query.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A business precondition was violated, or an aggregate/query is
    /// structurally invalid.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Optimistic concurrency conflict: another writer appended first.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A query legitimately returned nothing where a result was required.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage, transport or decode failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Returns `true` for optimistic concurrency conflicts.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Returns `true` for precondition failures.
    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }

    /// Returns `true` for invalid arguments.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Returns `true` when nothing was found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` for infrastructure failures.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}
