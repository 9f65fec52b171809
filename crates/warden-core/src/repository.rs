//! Log repository abstraction.

use async_trait::async_trait;

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::event::{Event, Sequence};
use crate::query::SearchQuery;

/// The only component that reads from and writes to the durable log.
///
/// Every query is validated before it reaches storage; an invalid query
/// fails with `DomainError::PreconditionFailed`.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Checks that the backing store is reachable.
    async fn health(&self) -> Result<(), DomainError>;

    /// Loads the events matching `query`, ordered by sequence and limited as
    /// the query requests.
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<Event>, DomainError>;

    /// Returns the highest sequence matching `query`, or zero if nothing
    /// matches.
    async fn latest_sequence(&self, query: &SearchQuery) -> Result<Sequence, DomainError>;

    /// Commits all aggregates atomically.
    ///
    /// Each event is appended only if its aggregate is still at the expected
    /// previous sequence; otherwise the whole push fails with
    /// `DomainError::AlreadyExists`. Preconditions run inside the same
    /// transaction. On success the assigned id, sequence and creation date
    /// are written back into the events.
    async fn push_aggregates(&self, aggregates: &mut [Aggregate]) -> Result<(), DomainError>;
}
