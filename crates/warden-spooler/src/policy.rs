//! Bounded retry-then-skip handling of failed events.

use tracing::warn;
use warden_core::error::DomainError;
use warden_core::event::Event;
use warden_core::view::ViewStore;

/// Records a failed reduce of `event` and decides whether to skip it.
///
/// The failure counter for `(view_name, event.sequence)` is incremented and
/// stored with the error message. Once it reaches `failure_count_until_skip`
/// the bookmark is moved past the event and `Ok(())` is returned; before
/// that the bookmark stays put and `err` is handed back so the event is
/// retried on the next cycle.
///
/// # Errors
///
/// Returns `err` while the event is still retried, or the store's error if
/// bookkeeping fails.
pub async fn handle_error(
    store: &dyn ViewStore,
    view_name: &str,
    event: &Event,
    err: DomainError,
    failure_count_until_skip: u64,
) -> Result<(), DomainError> {
    let mut failed = store.latest_failed_event(view_name, event.sequence).await?;
    failed.failure_count += 1;
    failed.err_msg = err.to_string();
    store.process_failed_event(&failed).await?;

    if failed.failure_count >= failure_count_until_skip {
        warn!(
            view = view_name,
            sequence = event.sequence,
            failure_count = failed.failure_count,
            error = %err,
            "skipping event"
        );
        store.process_sequence(view_name, event).await?;
        return Ok(());
    }
    Err(err)
}
