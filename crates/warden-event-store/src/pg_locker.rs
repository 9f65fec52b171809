//! `PostgreSQL` implementation of the `Locker` trait.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use warden_core::error::DomainError;
use warden_core::lock::{Lease, Locker};

use crate::error::internal;

/// Takes the lease if it is free, ours or expired. Returns nothing when
/// another locker holds an unexpired lease.
const RENEW_LEASE: &str = r"
INSERT INTO projections.locks (locker_id, locked_until, view_name)
VALUES ($1, now() + ($2::BIGINT * INTERVAL '1 millisecond'), $3)
ON CONFLICT (view_name) DO UPDATE
    SET locker_id = EXCLUDED.locker_id, locked_until = EXCLUDED.locked_until
    WHERE locks.locker_id = EXCLUDED.locker_id OR locks.locked_until < now()
RETURNING locked_until
";

const CURRENT_LEASE: &str = "SELECT locked_until FROM projections.locks WHERE view_name = $1";

/// Lease table backed by `projections.locks`.
#[derive(Debug, Clone)]
pub struct PgLocker {
    pool: PgPool,
}

impl PgLocker {
    /// Creates a new `PgLocker`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Locker for PgLocker {
    async fn renew(
        &self,
        locker_id: &str,
        view_name: &str,
        lease: Duration,
    ) -> Result<Lease, DomainError> {
        let millis = i64::try_from(lease.as_millis())
            .map_err(|_| DomainError::InvalidArgument(format!("lease {lease:?} too long")))?;

        let granted: Option<DateTime<Utc>> = sqlx::query_scalar(RENEW_LEASE)
            .bind(locker_id)
            .bind(millis)
            .bind(view_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| internal("unable to renew lease", &e))?;

        if let Some(locked_until) = granted {
            return Ok(Lease {
                locked_until,
                is_holder: true,
            });
        }

        let locked_until: DateTime<Utc> = sqlx::query_scalar(CURRENT_LEASE)
            .bind(view_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| internal("unable to read lease", &e))?;
        debug!(view_name, %locked_until, "lease held elsewhere");
        Ok(Lease {
            locked_until,
            is_holder: false,
        })
    }
}
