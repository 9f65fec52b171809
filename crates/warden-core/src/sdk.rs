//! Helpers for building read models straight from the log.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::event::{Event, Sequence};
use crate::query::SearchQuery;
use crate::repository::EventRepository;

/// A model that can fold events.
pub trait EventAppender {
    /// Folds `events`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if an event cannot be applied.
    fn append_events(&mut self, events: &[Event]) -> Result<(), DomainError>;
}

/// Loads the events matching `query` and folds them into `appender`.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if no events match, or the repository's
/// or appender's error.
pub async fn filter_and_append(
    repo: &dyn EventRepository,
    query: &SearchQuery,
    appender: &mut dyn EventAppender,
) -> Result<(), DomainError> {
    let events = repo.filter(query).await?;
    if events.is_empty() {
        return Err(DomainError::NotFound("no events found".into()));
    }
    appender.append_events(&events)
}

/// Pushes `aggregates` and folds the committed events into `appender`.
///
/// # Errors
///
/// Returns the repository's error (nothing is folded then) or the
/// appender's error.
pub async fn push_and_append(
    repo: &dyn EventRepository,
    aggregates: &mut [Aggregate],
    appender: &mut dyn EventAppender,
) -> Result<(), DomainError> {
    repo.push_aggregates(aggregates).await?;
    for aggregate in aggregates.iter() {
        appender.append_events(aggregate.events())?;
    }
    Ok(())
}

/// Header shared by read models of a single aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectRoot {
    /// Aggregate id.
    pub aggregate_id: String,
    /// Sequence of the last applied event.
    pub sequence: Sequence,
    /// Creation date of the first applied event.
    pub creation_date: Option<DateTime<Utc>>,
    /// Creation date of the last applied event.
    pub change_date: Option<DateTime<Utc>>,
    /// Owning organisation.
    pub resource_owner: String,
}

impl ObjectRoot {
    /// Updates the header from `event`.
    pub fn append_event(&mut self, event: &Event) {
        if self.aggregate_id.is_empty() {
            self.aggregate_id.clone_from(&event.aggregate_id);
        }
        if self.creation_date.is_none() {
            self.creation_date = event.creation_date;
        }
        if self.resource_owner.is_empty() {
            self.resource_owner.clone_from(&event.resource_owner);
        }
        self.change_date = event.creation_date;
        self.sequence = event.sequence;
    }

    /// Returns `true` if no event has been applied.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.sequence == 0
    }
}
