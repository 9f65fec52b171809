//! The worker pool.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use warden_core::clock::{Clock, SystemClock};
use warden_core::error::DomainError;
use warden_core::lock::Locker;
use warden_core::repository::EventRepository;

use crate::config::SpoolerConfig;
use crate::registry::HandlerRegistry;
use crate::spooled_handler::{Context, CycleOutcome, SpooledHandler};

type Queue = Arc<Mutex<mpsc::Receiver<SpooledHandler>>>;

/// Runs every registered handler on a fixed pool of workers.
pub struct Spooler {
    config: SpoolerConfig,
    registry: HandlerRegistry,
    repository: Arc<dyn EventRepository>,
    locker: Arc<dyn Locker>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Spooler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spooler")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Controls a started spooler.
#[derive(Debug)]
pub struct SpoolerHandle {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl SpoolerHandle {
    /// Asks every worker to stop after its current event.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until every worker and pending requeue has exited.
    pub async fn join(self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Spooler {
    /// Creates a spooler on the system clock.
    #[must_use]
    pub fn new(
        config: SpoolerConfig,
        registry: HandlerRegistry,
        repository: Arc<dyn EventRepository>,
        locker: Arc<dyn Locker>,
    ) -> Self {
        Self {
            config,
            registry,
            repository,
            locker,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used to measure remaining lease time.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Spawns the workers and queues every handler. Workers stop when
    /// `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if the configuration is
    /// unusable.
    pub fn start(self, token: CancellationToken) -> Result<SpoolerHandle, DomainError> {
        self.config.validate()?;

        let capacity = self.registry.len().max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        for handler in self.registry.handlers() {
            if sender
                .try_send(SpooledHandler::new(Arc::clone(handler)))
                .is_err()
            {
                return Err(DomainError::Internal("work queue full at startup".into()));
            }
        }

        let ctx = Arc::new(Context {
            repository: self.repository,
            locker: self.locker,
            clock: self.clock,
        });
        let queue: Queue = Arc::new(Mutex::new(receiver));
        let tracker = TaskTracker::new();

        for index in 0..self.config.concurrent_workers {
            let worker_id = format!("{}--{index}", self.config.locker_id);
            tracker.spawn(run_worker(
                worker_id,
                Arc::clone(&queue),
                sender.clone(),
                Arc::clone(&ctx),
                tracker.clone(),
                token.clone(),
            ));
        }
        info!(
            workers = self.config.concurrent_workers,
            handlers = self.registry.len(),
            locker_id = %self.config.locker_id,
            "spooler started"
        );

        Ok(SpoolerHandle { token, tracker })
    }
}

async fn run_worker(
    worker_id: String,
    queue: Queue,
    sender: mpsc::Sender<SpooledHandler>,
    ctx: Arc<Context>,
    tracker: TaskTracker,
    token: CancellationToken,
) {
    debug!(worker = %worker_id, "worker started");
    loop {
        let next = {
            let mut receiver = queue.lock().await;
            tokio::select! {
                biased;
                () = token.cancelled() => None,
                spooled = receiver.recv() => spooled,
            }
        };
        let Some(spooled) = next else {
            break;
        };

        let outcome = spooled.run_cycle(&worker_id, &ctx, &token).await;
        let view = spooled.handler.view_model();
        match &outcome {
            CycleOutcome::Failed(err) => {
                warn!(view, worker = %worker_id, error = %err, "cycle failed");
            }
            CycleOutcome::LeaseLost => {
                warn!(view, worker = %worker_id, "lease lost during cycle");
            }
            CycleOutcome::Cancelled => break,
            other => debug!(view, worker = %worker_id, outcome = ?other, "cycle finished"),
        }

        let delay = spooled.requeue_delay(&outcome);
        tracker.spawn(requeue(spooled, delay, sender.clone(), token.clone()));
    }
    debug!(worker = %worker_id, "worker stopped");
}

async fn requeue(
    mut spooled: SpooledHandler,
    delay: std::time::Duration,
    sender: mpsc::Sender<SpooledHandler>,
    token: CancellationToken,
) {
    tokio::select! {
        biased;
        () = token.cancelled() => {}
        () = tokio::time::sleep(delay) => {
            spooled.queued_at = Instant::now();
            // The receiver only goes away on shutdown.
            let _ = sender.send(spooled).await;
        }
    }
}
