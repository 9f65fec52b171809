//! Shared test helpers for daemon integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;
use warden_core::aggregate::{AggregateCreator, EditorContext};
use warden_core::repository::EventRepository;
use warden_core::view::ViewStore;
use warden_event_store::{PgEventRepository, PgViewStore};
use warden_spooler::{HandlerRegistry, SpoolerConfig};

use warden_daemon::config::DaemonConfig;
use warden_daemon::projections::{self, aggregate_heads::AggregateHeads};
use warden_daemon::routes;
use warden_daemon::state::AppState;

/// Everything a test needs to drive the daemon against one database.
pub struct TestDaemon {
    pub app: Router,
    pub config: DaemonConfig,
    pub registry: HandlerRegistry,
    pub event_repository: Arc<dyn EventRepository>,
    pub aggregate_heads: Option<Arc<AggregateHeads>>,
}

/// Fast spooler settings with `aggregate_heads` following `user`.
pub fn test_config() -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.spooler = SpoolerConfig {
        concurrent_workers: 1,
        cycle_duration_ms: 10,
        lease_duration_ms: 2_000,
        locker_id: "test-daemon".into(),
        ..SpoolerConfig::default()
    };
    config.projections.aggregate_heads = vec!["user".into()];
    config
}

/// Builds the router and projections the way `main.rs` does.
pub fn build_test_daemon(pool: &PgPool) -> TestDaemon {
    let config = test_config();
    let event_repository: Arc<dyn EventRepository> =
        Arc::new(PgEventRepository::new(pool.clone()));
    let view_store: Arc<dyn ViewStore> = Arc::new(PgViewStore::new(pool.clone()));
    let (registry, aggregate_heads) =
        projections::build_registry(&config, &view_store, pool).unwrap();
    let app = routes::router(AppState::new(
        Arc::clone(&event_repository),
        view_store,
        aggregate_heads.clone(),
    ));
    TestDaemon {
        app,
        config,
        registry,
        event_repository,
        aggregate_heads,
    }
}

/// Appends `count` events to the user `id`, whose head is `head`.
pub async fn append_user_events(repo: &dyn EventRepository, id: &str, head: u64, count: usize) {
    let editor = EditorContext {
        user: "admin".into(),
        resource_owner: "org-1".into(),
    };
    let mut user = AggregateCreator::new("user-api")
        .new_aggregate(&editor, id, "user", "v1", head)
        .unwrap();
    for _ in 0..count {
        user.append_event("user.changed", &()).unwrap();
    }
    repo.push_aggregates(&mut [user]).await.unwrap();
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Polls `uri` until it answers 200 with `field == expected`, or five
/// seconds pass.
///
/// # Panics
///
/// Panics if the response never matches.
pub async fn wait_for_field(app: &Router, uri: &str, field: &str, expected: i64) -> serde_json::Value {
    for _ in 0..500 {
        let (status, json) = get_json(app.clone(), uri).await;
        if status == StatusCode::OK && json[field] == expected {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{uri} never reported {field} = {expected}");
}
