//! Cluster-wide leases over view names.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainError;

/// Outcome of a lease renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    /// When the current holder's lease expires.
    pub locked_until: DateTime<Utc>,
    /// Whether the caller is the current holder.
    pub is_holder: bool,
}

/// Grants time-bounded, renewable mutual exclusion over a view name.
///
/// Any store with an atomic conditional upsert can implement it.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Takes or extends the lease on `view_name` for `locker_id`.
    ///
    /// Succeeds with `is_holder == false` when another locker holds an
    /// unexpired lease; errors are reserved for storage failures.
    async fn renew(
        &self,
        locker_id: &str,
        view_name: &str,
        lease: Duration,
    ) -> Result<Lease, DomainError>;
}
