//! In-memory `Locker` with the same lease rules as the `PostgreSQL` table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_core::clock::{Clock, SystemClock};
use warden_core::error::DomainError;
use warden_core::lock::{Lease, Locker};

#[derive(Debug, Clone)]
struct Entry {
    locker_id: String,
    locked_until: DateTime<Utc>,
}

/// A lease table held in a `HashMap`.
///
/// A lease is granted when the view is unlocked, already held by the caller,
/// or its previous holder's lease has expired.
pub struct InMemoryLocker {
    leases: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    failing: AtomicBool,
    renewals: AtomicUsize,
}

impl std::fmt::Debug for InMemoryLocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLocker")
            .field("leases", &self.leases)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryLocker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLocker {
    /// Creates an empty lease table on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty lease table on `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            clock,
            failing: AtomicBool::new(false),
            renewals: AtomicUsize::new(0),
        }
    }

    /// Makes every subsequent `renew` fail with an internal error (or succeed
    /// again when `false`).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Installs a lease for `locker_id` until `locked_until`, bypassing the
    /// holder check.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn grant(&self, view_name: &str, locker_id: &str, locked_until: DateTime<Utc>) {
        self.leases.lock().unwrap().insert(
            view_name.to_owned(),
            Entry {
                locker_id: locker_id.to_owned(),
                locked_until,
            },
        );
    }

    /// Current holder of `view_name`'s lease, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn holder(&self, view_name: &str) -> Option<String> {
        self.leases
            .lock()
            .unwrap()
            .get(view_name)
            .map(|entry| entry.locker_id.clone())
    }

    /// Number of `renew` calls so far.
    #[must_use]
    pub fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Locker for InMemoryLocker {
    async fn renew(
        &self,
        locker_id: &str,
        view_name: &str,
        lease: Duration,
    ) -> Result<Lease, DomainError> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::Internal("lock table unavailable".into()));
        }
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| DomainError::InvalidArgument(format!("lease duration: {e}")))?;
        let now = self.clock.now();
        let mut leases = self.leases.lock().unwrap();
        match leases.get(view_name) {
            Some(entry) if entry.locker_id != locker_id && entry.locked_until >= now => Ok(Lease {
                locked_until: entry.locked_until,
                is_holder: false,
            }),
            _ => {
                let locked_until = now + lease;
                leases.insert(
                    view_name.to_owned(),
                    Entry {
                        locker_id: locker_id.to_owned(),
                        locked_until,
                    },
                );
                Ok(Lease {
                    locked_until,
                    is_holder: true,
                })
            }
        }
    }
}
