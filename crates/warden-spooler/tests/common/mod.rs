//! Shared fixtures for spooler integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use warden_core::aggregate::{AggregateCreator, EditorContext};
use warden_core::error::DomainError;
use warden_core::event::Event;
use warden_core::handler::Handler;
use warden_core::query::SearchQuery;
use warden_core::repository::EventRepository;
use warden_core::view::ViewStore;
use warden_spooler::{ProjectionBase, SpoolerConfig};
use warden_test_support::{InMemoryEventRepository, InMemoryViewStore};

pub const VIEW: &str = "user_names";

#[derive(Deserialize)]
struct NameSet {
    name: String,
}

/// Read model of the latest name per user. Reducing an event twice leaves
/// the same state.
pub struct UserNames {
    base: ProjectionBase,
    names: Mutex<HashMap<String, String>>,
    reductions: AtomicUsize,
    failing_sequence: Option<u64>,
}

impl UserNames {
    pub fn new(config: &SpoolerConfig, store: Arc<InMemoryViewStore>) -> Self {
        Self {
            base: ProjectionBase::new(VIEW, ["user"], config.handler_settings(VIEW), store)
                .with_event_types(["user.named"]),
            names: Mutex::new(HashMap::new()),
            reductions: AtomicUsize::new(0),
            failing_sequence: None,
        }
    }

    pub fn failing_at(mut self, sequence: u64) -> Self {
        self.failing_sequence = Some(sequence);
        self
    }

    pub fn name_of(&self, user: &str) -> Option<String> {
        self.names.lock().unwrap().get(user).cloned()
    }

    pub fn names(&self) -> HashMap<String, String> {
        self.names.lock().unwrap().clone()
    }

    pub fn reductions(&self) -> usize {
        self.reductions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for UserNames {
    fn view_model(&self) -> &str {
        self.base.view_name()
    }

    async fn event_query(&self) -> Result<SearchQuery, DomainError> {
        self.base.event_query().await
    }

    async fn reduce(&self, event: &Event) -> Result<(), DomainError> {
        if self.failing_sequence == Some(event.sequence) {
            return Err(DomainError::Internal("name rejected".into()));
        }
        let payload: NameSet = event.data_as()?;
        self.names
            .lock()
            .unwrap()
            .insert(event.aggregate_id.clone(), payload.name);
        self.reductions.fetch_add(1, Ordering::SeqCst);
        self.base.processed(event).await
    }

    async fn on_error(&self, event: &Event, err: DomainError) -> Result<(), DomainError> {
        self.base.on_error(event, err).await
    }

    async fn on_success(&self) -> Result<(), DomainError> {
        self.base.on_success().await
    }

    fn minimum_cycle_duration(&self) -> Duration {
        self.base.minimum_cycle_duration()
    }

    fn lock_duration(&self) -> Duration {
        self.base.lock_duration()
    }

    fn query_limit(&self) -> u64 {
        self.base.query_limit()
    }
}

/// Fast-paced settings with a single worker, so the lease stays with the
/// worker that took it first.
pub fn test_config(locker_id: &str) -> SpoolerConfig {
    SpoolerConfig {
        concurrent_workers: 1,
        bulk_limit: 2,
        failure_count_until_skip: 2,
        cycle_duration_ms: 10,
        lease_duration_ms: 2_000,
        locker_id: locker_id.into(),
        handlers: HashMap::new(),
    }
}

/// Appends one `user.named` event per name to `user_id`, chained on the
/// aggregate's current head.
pub async fn name_user(repo: &InMemoryEventRepository, user_id: &str, names: &[&str]) {
    let head = repo
        .committed_events()
        .iter()
        .filter(|e| e.aggregate_id == user_id)
        .map(|e| e.sequence)
        .max()
        .unwrap_or(0);
    let editor = EditorContext {
        user: "admin".into(),
        resource_owner: "org-1".into(),
    };
    let mut aggregate = AggregateCreator::new("user-api")
        .new_aggregate(&editor, user_id, "user", "v1", head)
        .unwrap();
    for name in names {
        aggregate
            .append_event("user.named", &serde_json::json!({ "name": name }))
            .unwrap();
    }
    repo.push_aggregates(&mut [aggregate]).await.unwrap();
}

/// Polls `condition` until it holds or five seconds pass.
///
/// # Panics
///
/// Panics if the condition never holds.
pub async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within five seconds");
}

pub async fn bookmark(store: &InMemoryViewStore) -> u64 {
    store.latest_sequence(VIEW).await.unwrap().current_sequence
}
