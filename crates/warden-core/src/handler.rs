//! Projection handler contract.
//!
//! A handler folds events into one read model. The spooler owns scheduling,
//! leasing and batching; the handler owns the read model and its bookmark.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DomainError;
use crate::event::Event;
use crate::query::SearchQuery;

/// A read-model builder driven by the spooler.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Stable view name used for leasing and bookmarking.
    fn view_model(&self) -> &str;

    /// Query for the events this view has not processed yet: its aggregate
    /// and event types plus its current bookmark.
    async fn event_query(&self) -> Result<SearchQuery, DomainError>;

    /// Applies one event to the read model.
    ///
    /// Delivery is at-least-once, so applying an event twice must leave the
    /// read model as applying it once.
    async fn reduce(&self, event: &Event) -> Result<(), DomainError>;

    /// Records a failed `reduce`.
    ///
    /// Returns `Ok(())` when the event was skipped and processing may go on,
    /// or an error to stop the cycle and retry the event later.
    async fn on_error(&self, event: &Event, err: DomainError) -> Result<(), DomainError>;

    /// Called after a cycle processed its events without stopping.
    async fn on_success(&self) -> Result<(), DomainError>;

    /// Pacing floor between two polls.
    fn minimum_cycle_duration(&self) -> Duration;

    /// Lease window requested while processing.
    fn lock_duration(&self) -> Duration;

    /// Maximum number of events fetched per poll.
    fn query_limit(&self) -> u64;
}
