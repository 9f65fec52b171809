//! Shared application state.

use std::fmt;
use std::sync::Arc;

use warden_core::repository::EventRepository;
use warden_core::view::ViewStore;

use crate::projections::aggregate_heads::AggregateHeads;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The event log.
    pub event_repository: Arc<dyn EventRepository>,
    /// Projection bookkeeping.
    pub view_store: Arc<dyn ViewStore>,
    /// The `aggregate_heads` view, if enabled.
    pub aggregate_heads: Option<Arc<AggregateHeads>>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("aggregate_heads", &self.aggregate_heads.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        event_repository: Arc<dyn EventRepository>,
        view_store: Arc<dyn ViewStore>,
        aggregate_heads: Option<Arc<AggregateHeads>>,
    ) -> Self {
        Self {
            event_repository,
            view_store,
            aggregate_heads,
        }
    }
}
