//! Keeping a held lease alive while a handler is processing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use warden_core::lock::Locker;

/// Why the keeper stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaseEnd {
    /// The token was cancelled; the lease is simply left to expire.
    Released,
    /// Renewal failed or another locker took over.
    Lost,
}

/// Renewal period for a lease window: half the window, at least 1 ms.
pub(crate) fn renewal_interval(window: Duration) -> Duration {
    (window / 2).max(Duration::from_millis(1))
}

/// Time left until `locked_until`, zero if it has passed.
pub(crate) fn remaining(locked_until: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (locked_until - now).to_std().unwrap_or(Duration::ZERO)
}

/// Renews the lease on `view_name` every half window until `token` is
/// cancelled or a renewal does not come back as held.
pub(crate) async fn keep(
    locker: &dyn Locker,
    worker_id: &str,
    view_name: &str,
    window: Duration,
    token: &CancellationToken,
) -> LeaseEnd {
    let interval = renewal_interval(window);
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => return LeaseEnd::Released,
            () = tokio::time::sleep(interval) => {}
        }
        match locker.renew(worker_id, view_name, window).await {
            Ok(lease) if lease.is_holder => {
                debug!(view = view_name, worker = worker_id, "lease renewed");
            }
            Ok(lease) => {
                warn!(
                    view = view_name,
                    worker = worker_id,
                    locked_until = %lease.locked_until,
                    "lease taken over"
                );
                return LeaseEnd::Lost;
            }
            Err(err) => {
                warn!(view = view_name, worker = worker_id, error = %err, "lease renewal failed");
                return LeaseEnd::Lost;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use warden_test_support::{FixedClock, InMemoryLocker};

    #[test]
    fn test_renewal_interval_is_half_the_window() {
        assert_eq!(renewal_interval(Duration::from_secs(30)), Duration::from_secs(15));
        assert_eq!(renewal_interval(Duration::from_nanos(1)), Duration::from_millis(1));
    }

    #[test]
    fn test_remaining_never_negative() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        assert_eq!(
            remaining(now + chrono::Duration::seconds(4), now),
            Duration::from_secs(4)
        );
        assert_eq!(remaining(now - chrono::Duration::seconds(4), now), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_keep_returns_released_on_cancel() {
        let locker = InMemoryLocker::new();
        let token = CancellationToken::new();
        token.cancel();

        let end = keep(&locker, "w--0", "users", Duration::from_secs(10), &token).await;

        assert_eq!(end, LeaseEnd::Released);
        assert_eq!(locker.renewals(), 0);
    }

    #[tokio::test]
    async fn test_keep_reports_takeover_as_lost() {
        // Arrange
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let locker = InMemoryLocker::with_clock(Arc::new(FixedClock(now)));
        locker.grant("users", "other--0", now + chrono::Duration::minutes(5));
        let token = CancellationToken::new();

        // Act
        let end = keep(&locker, "w--0", "users", Duration::from_millis(20), &token).await;

        // Assert
        assert_eq!(end, LeaseEnd::Lost);
        assert_eq!(locker.renewals(), 1);
    }

    #[tokio::test]
    async fn test_keep_reports_storage_failure_as_lost() {
        let locker = InMemoryLocker::new();
        locker.set_failing(true);
        let token = CancellationToken::new();

        let end = keep(&locker, "w--0", "users", Duration::from_millis(20), &token).await;

        assert_eq!(end, LeaseEnd::Lost);
    }
}
