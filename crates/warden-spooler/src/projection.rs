//! Reusable projection plumbing for handlers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use warden_core::error::DomainError;
use warden_core::event::{AggregateType, Event, EventType};
use warden_core::query::SearchQuery;
use warden_core::view::ViewStore;

use crate::config::HandlerSettings;
use crate::policy;

/// Bookmarking, failure bookkeeping and tuning for one view.
///
/// A handler embeds a `ProjectionBase` and forwards the bookkeeping parts of
/// [`warden_core::handler::Handler`] to it; its own `reduce` writes the read
/// model and then calls [`ProjectionBase::processed`].
#[derive(Clone)]
pub struct ProjectionBase {
    view_name: String,
    aggregate_types: Vec<AggregateType>,
    event_types: Vec<EventType>,
    settings: HandlerSettings,
    store: Arc<dyn ViewStore>,
}

impl fmt::Debug for ProjectionBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionBase")
            .field("view_name", &self.view_name)
            .field("aggregate_types", &self.aggregate_types)
            .field("event_types", &self.event_types)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ProjectionBase {
    /// Creates the plumbing for `view_name`, reading events of
    /// `aggregate_types`.
    pub fn new<I, T>(
        view_name: impl Into<String>,
        aggregate_types: I,
        settings: HandlerSettings,
        store: Arc<dyn ViewStore>,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AggregateType>,
    {
        Self {
            view_name: view_name.into(),
            aggregate_types: aggregate_types.into_iter().map(Into::into).collect(),
            event_types: Vec::new(),
            settings,
            store,
        }
    }

    /// Narrows the view to the given event types.
    #[must_use]
    pub fn with_event_types<I, T>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        self.event_types = event_types.into_iter().map(Into::into).collect();
        self
    }

    /// The view name.
    #[must_use]
    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    /// The bookkeeping store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ViewStore> {
        &self.store
    }

    /// Events of this view's types past its stored bookmark.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the bookmark cannot be read.
    pub async fn event_query(&self) -> Result<SearchQuery, DomainError> {
        let current = self.store.latest_sequence(&self.view_name).await?;
        let mut query = SearchQuery::new().aggregate_type_filter(self.aggregate_types.clone());
        if !self.event_types.is_empty() {
            query = query.event_type_filter(self.event_types.clone());
        }
        Ok(query
            .latest_sequence_filter(current.current_sequence)
            .limit(self.settings.bulk_limit))
    }

    /// Moves the bookmark to `event`.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn processed(&self, event: &Event) -> Result<(), DomainError> {
        self.store.process_sequence(&self.view_name, event).await
    }

    /// Applies the retry-then-skip policy to a failed reduce.
    ///
    /// # Errors
    ///
    /// Returns `err` while the event is still retried.
    pub async fn on_error(&self, event: &Event, err: DomainError) -> Result<(), DomainError> {
        policy::handle_error(
            self.store.as_ref(),
            &self.view_name,
            event,
            err,
            self.settings.failure_count_until_skip,
        )
        .await
    }

    /// Records a successful spooler cycle.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn on_success(&self) -> Result<(), DomainError> {
        self.store.update_spooler_run_timestamp(&self.view_name).await
    }

    /// Pacing floor between polls.
    #[must_use]
    pub fn minimum_cycle_duration(&self) -> Duration {
        self.settings.minimum_cycle_duration
    }

    /// Lease window.
    #[must_use]
    pub fn lock_duration(&self) -> Duration {
        self.settings.lock_duration
    }

    /// Events fetched per poll.
    #[must_use]
    pub fn query_limit(&self) -> u64 {
        self.settings.bulk_limit
    }
}
