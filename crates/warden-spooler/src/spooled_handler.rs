//! One handler's lease-and-catch-up cycle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use warden_core::clock::Clock;
use warden_core::error::DomainError;
use warden_core::event::Event;
use warden_core::handler::Handler;
use warden_core::lock::Locker;
use warden_core::repository::EventRepository;

use crate::lease::{self, LeaseEnd};

/// What a cycle achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The view was already caught up.
    Idle,
    /// Events were processed (or skipped) and the view is caught up.
    CaughtUp {
        /// Number of events handled in the cycle.
        processed: usize,
    },
    /// Another locker holds the view.
    LeaseUnavailable {
        /// When to try again.
        retry_after: Duration,
    },
    /// The lease was lost mid-cycle; processing stopped after the current
    /// event.
    LeaseLost,
    /// A query, bookkeeping or unskipped reduce failure ended the cycle.
    Failed(DomainError),
    /// The spooler is shutting down.
    Cancelled,
}

/// Collaborators shared by every worker.
pub(crate) struct Context {
    pub(crate) repository: Arc<dyn EventRepository>,
    pub(crate) locker: Arc<dyn Locker>,
    pub(crate) clock: Arc<dyn Clock>,
}

/// A handler travelling through the work queue.
#[derive(Clone)]
pub(crate) struct SpooledHandler {
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) queued_at: Instant,
}

impl fmt::Debug for SpooledHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpooledHandler")
            .field("view", &self.handler.view_model())
            .field("queued_at", &self.queued_at)
            .finish()
    }
}

impl SpooledHandler {
    pub(crate) fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            queued_at: Instant::now(),
        }
    }

    /// How long to wait before queueing the handler again.
    pub(crate) fn requeue_delay(&self, outcome: &CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::LeaseUnavailable { retry_after } => *retry_after,
            CycleOutcome::LeaseLost => self.handler.lock_duration(),
            _ => self
                .handler
                .minimum_cycle_duration()
                .saturating_sub(self.queued_at.elapsed()),
        }
    }

    /// Leases the view and catches it up, renewing the lease while working.
    pub(crate) async fn run_cycle(
        &self,
        worker_id: &str,
        ctx: &Context,
        token: &CancellationToken,
    ) -> CycleOutcome {
        if token.is_cancelled() {
            return CycleOutcome::Cancelled;
        }
        let view = self.handler.view_model();
        let window = self.handler.lock_duration();

        match ctx.locker.renew(worker_id, view, window).await {
            Ok(lease) if lease.is_holder => {}
            Ok(lease) => {
                let retry_after = lease::remaining(lease.locked_until, ctx.clock.now());
                debug!(view, worker = worker_id, ?retry_after, "view leased elsewhere");
                return CycleOutcome::LeaseUnavailable { retry_after };
            }
            Err(err) => {
                warn!(view, worker = worker_id, error = %err, "unable to lease view");
                return CycleOutcome::LeaseUnavailable {
                    retry_after: window,
                };
            }
        }

        let work_token = token.child_token();
        let work = self.catch_up(ctx, &work_token);
        let keeper = lease::keep(ctx.locker.as_ref(), worker_id, view, window, &work_token);
        tokio::pin!(work);

        tokio::select! {
            outcome = &mut work => {
                work_token.cancel();
                outcome
            }
            end = keeper => match end {
                LeaseEnd::Lost => {
                    work_token.cancel();
                    let _ = work.await;
                    CycleOutcome::LeaseLost
                }
                LeaseEnd::Released => work.await,
            },
        }
    }

    /// Folds batches until a short batch shows the view is caught up.
    async fn catch_up(&self, ctx: &Context, token: &CancellationToken) -> CycleOutcome {
        let view = self.handler.view_model();
        let limit = self.handler.query_limit();
        let mut processed = 0;

        loop {
            if token.is_cancelled() {
                return CycleOutcome::Cancelled;
            }
            let batch = match self.next_batch(ctx.repository.as_ref(), limit).await {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(view, error = %err, "unable to load events");
                    return CycleOutcome::Failed(err);
                }
            };
            let fetched = batch.len();

            for event in &batch {
                if token.is_cancelled() {
                    return CycleOutcome::Cancelled;
                }
                if let Err(err) = self.process(event).await {
                    return CycleOutcome::Failed(err);
                }
                processed += 1;
            }

            if fetched == 0 || limit == 0 || u64::try_from(fetched).unwrap_or(u64::MAX) < limit {
                break;
            }
        }

        if let Err(err) = self.handler.on_success().await {
            warn!(view, error = %err, "unable to record spooler run");
            return CycleOutcome::Failed(err);
        }
        debug!(view, processed, "view caught up");
        if processed == 0 {
            CycleOutcome::Idle
        } else {
            CycleOutcome::CaughtUp { processed }
        }
    }

    /// Events past the handler's bookmark, or nothing if the log has not
    /// moved past it.
    async fn next_batch(
        &self,
        repository: &dyn EventRepository,
        limit: u64,
    ) -> Result<Vec<Event>, DomainError> {
        let query = self.handler.event_query().await?.limit(limit);
        let latest = repository
            .latest_sequence(&query.to_max_sequence_query())
            .await?;
        if latest <= query.processed_sequence() {
            return Ok(Vec::new());
        }
        repository.filter(&query).await
    }

    /// Reduces one event, handing failures to the handler's error policy.
    async fn process(&self, event: &Event) -> Result<(), DomainError> {
        let Err(err) = self.handler.reduce(event).await else {
            return Ok(());
        };
        warn!(
            view = self.handler.view_model(),
            sequence = event.sequence,
            error = %err,
            "reduce failed"
        );
        self.handler.on_error(event, err).await
    }
}
