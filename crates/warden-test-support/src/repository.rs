//! Test repositories: in-memory `EventRepository` implementations for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;
use warden_core::aggregate::Aggregate;
use warden_core::clock::{Clock, SystemClock};
use warden_core::error::DomainError;
use warden_core::event::{AggregateType, Event, Sequence};
use warden_core::query::SearchQuery;
use warden_core::repository::EventRepository;

#[derive(Debug, Default)]
struct Log {
    events: Vec<Event>,
    last_sequence: Sequence,
}

impl Log {
    fn head(&self, aggregate_type: &AggregateType, aggregate_id: &str) -> Sequence {
        self.events
            .iter()
            .filter(|e| &e.aggregate_type == aggregate_type && e.aggregate_id == aggregate_id)
            .map(|e| e.sequence)
            .max()
            .unwrap_or(0)
    }
}

/// An event repository backed by a vector.
///
/// Implements the same compare-and-append and precondition rules as the
/// `PostgreSQL` store, with a single lock standing in for the transaction.
pub struct InMemoryEventRepository {
    log: Mutex<Log>,
    clock: Arc<dyn Clock>,
    filter_calls: AtomicUsize,
    max_sequence_calls: AtomicUsize,
}

impl std::fmt::Debug for InMemoryEventRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventRepository")
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventRepository {
    /// Creates an empty log stamped by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty log stamped by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            log: Mutex::new(Log::default()),
            clock,
            filter_calls: AtomicUsize::new(0),
            max_sequence_calls: AtomicUsize::new(0),
        }
    }

    /// Returns a snapshot of every committed event, in sequence order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn committed_events(&self) -> Vec<Event> {
        self.log.lock().unwrap().events.clone()
    }

    /// Number of `filter` calls so far.
    #[must_use]
    pub fn filter_calls(&self) -> usize {
        self.filter_calls.load(Ordering::SeqCst)
    }

    /// Number of `latest_sequence` calls so far.
    #[must_use]
    pub fn max_sequence_calls(&self) -> usize {
        self.max_sequence_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn health(&self) -> Result<(), DomainError> {
        Ok(())
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<Event>, DomainError> {
        query.validate()?;
        self.filter_calls.fetch_add(1, Ordering::SeqCst);
        let log = self.log.lock().unwrap();
        let mut events: Vec<Event> = log
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        if query.is_desc() {
            events.reverse();
        }
        if query.row_limit() > 0 {
            events.truncate(usize::try_from(query.row_limit()).unwrap_or(usize::MAX));
        }
        Ok(events)
    }

    async fn latest_sequence(&self, query: &SearchQuery) -> Result<Sequence, DomainError> {
        query.validate()?;
        self.max_sequence_calls.fetch_add(1, Ordering::SeqCst);
        let log = self.log.lock().unwrap();
        Ok(log
            .events
            .iter()
            .filter(|e| query.matches(e))
            .map(|e| e.sequence)
            .max()
            .unwrap_or(0))
    }

    async fn push_aggregates(&self, aggregates: &mut [Aggregate]) -> Result<(), DomainError> {
        aggregates.iter().try_for_each(Aggregate::validate)?;

        let mut log = self.log.lock().unwrap();
        let mut staged = Log {
            events: log.events.clone(),
            last_sequence: log.last_sequence,
        };
        let mut written: Vec<Vec<Event>> = Vec::with_capacity(aggregates.len());

        for aggregate in aggregates.iter() {
            if let Some(precondition) = aggregate.precondition() {
                let loaded: Vec<Event> = staged
                    .events
                    .iter()
                    .filter(|e| precondition.query.matches(e))
                    .cloned()
                    .collect();
                precondition.evaluate(&loaded)?;
            }

            let mut expected = aggregate.latest_sequence();
            let mut events = aggregate.events().to_vec();
            for event in &mut events {
                let head = staged.head(aggregate.aggregate_type(), aggregate.id());
                if head != expected {
                    return Err(DomainError::AlreadyExists(format!(
                        "aggregate {}/{} is at sequence {head}, expected {expected}",
                        aggregate.aggregate_type(),
                        aggregate.id()
                    )));
                }
                staged.last_sequence += 1;
                event.id = Some(Uuid::new_v4());
                event.sequence = staged.last_sequence;
                event.previous_sequence = expected;
                event.creation_date = Some(self.clock.now());
                staged.events.push(event.clone());
                expected = event.sequence;
            }
            written.push(events);
        }

        *log = staged;
        drop(log);
        for (aggregate, events) in aggregates.iter_mut().zip(written) {
            aggregate.events_mut().clone_from_slice(&events);
        }
        Ok(())
    }
}

/// An event repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn health(&self) -> Result<(), DomainError> {
        Err(DomainError::Internal("connection refused".into()))
    }

    async fn filter(&self, _query: &SearchQuery) -> Result<Vec<Event>, DomainError> {
        Err(DomainError::Internal("connection refused".into()))
    }

    async fn latest_sequence(&self, _query: &SearchQuery) -> Result<Sequence, DomainError> {
        Err(DomainError::Internal("connection refused".into()))
    }

    async fn push_aggregates(&self, _aggregates: &mut [Aggregate]) -> Result<(), DomainError> {
        Err(DomainError::Internal("connection refused".into()))
    }
}
