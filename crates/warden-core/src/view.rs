//! Projection bookkeeping: bookmarks and failed events per view.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DomainError;
use crate::event::{Event, Sequence};

/// How far a view has folded the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentSequence {
    /// View name.
    pub view_name: String,
    /// Last processed (or skipped) sequence; zero before the first event.
    pub current_sequence: Sequence,
    /// Creation date of the event at `current_sequence`.
    pub event_timestamp: Option<DateTime<Utc>>,
    /// When the spooler last finished a cycle for this view.
    pub last_successful_spooler_run: Option<DateTime<Utc>>,
}

impl CurrentSequence {
    /// Bookmark of a view that has processed nothing yet.
    #[must_use]
    pub fn initial(view_name: impl Into<String>) -> Self {
        Self {
            view_name: view_name.into(),
            current_sequence: 0,
            event_timestamp: None,
            last_successful_spooler_run: None,
        }
    }
}

/// Failure record of one event in one view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEvent {
    /// View name.
    pub view_name: String,
    /// Sequence of the failing event.
    pub failed_sequence: Sequence,
    /// How often reducing it has failed.
    pub failure_count: u64,
    /// Last error message.
    pub err_msg: String,
}

impl FailedEvent {
    /// A record with no failures yet.
    #[must_use]
    pub fn new(view_name: impl Into<String>, failed_sequence: Sequence) -> Self {
        Self {
            view_name: view_name.into(),
            failed_sequence,
            failure_count: 0,
            err_msg: String::new(),
        }
    }
}

/// Durable bookkeeping for projections.
///
/// Bookmarks only move forward: `process_sequence` with an older event is a
/// no-op, which keeps replays harmless.
#[async_trait]
pub trait ViewStore: Send + Sync {
    /// Bookmark of `view_name`; the initial bookmark if none is stored.
    async fn latest_sequence(&self, view_name: &str) -> Result<CurrentSequence, DomainError>;

    /// Advances the bookmark of `view_name` to `event`.
    async fn process_sequence(&self, view_name: &str, event: &Event) -> Result<(), DomainError>;

    /// Failure record for `sequence`; a fresh record if none is stored.
    async fn latest_failed_event(
        &self,
        view_name: &str,
        sequence: Sequence,
    ) -> Result<FailedEvent, DomainError>;

    /// Stores a failure record.
    async fn process_failed_event(&self, failed_event: &FailedEvent) -> Result<(), DomainError>;

    /// Records that a spooler cycle for `view_name` finished successfully.
    async fn update_spooler_run_timestamp(&self, view_name: &str) -> Result<(), DomainError>;

    /// All stored bookmarks, ordered by view name.
    async fn current_sequences(&self) -> Result<Vec<CurrentSequence>, DomainError>;
}
