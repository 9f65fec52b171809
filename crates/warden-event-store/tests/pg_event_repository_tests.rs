//! Integration tests for `PgEventRepository`.
//!
//! Each test gets a fresh database from `sqlx::test` through `DATABASE_URL`.

use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use warden_core::aggregate::{Aggregate, AggregateCreator, EditorContext};
use warden_core::error::DomainError;
use warden_core::event::Event;
use warden_core::query::SearchQuery;
use warden_core::repository::EventRepository;
use warden_event_store::pg_event_repository::PgEventRepository;
use warden_event_store::schema::EVENTS_TABLE;

#[derive(Serialize)]
struct Added {
    name: &'static str,
}

/// Helper to build an aggregate with a fixed editor.
fn make_aggregate(aggregate_type: &str, id: &str, latest_sequence: u64) -> Aggregate {
    let editor = EditorContext {
        user: "u-admin".into(),
        resource_owner: "org-1".into(),
    };
    AggregateCreator::new("admin-api")
        .new_aggregate(&editor, id, aggregate_type, "v1", latest_sequence)
        .unwrap()
}

fn no_events(events: &[Event]) -> Result<(), DomainError> {
    if events.is_empty() {
        Ok(())
    } else {
        Err(DomainError::PreconditionFailed("already registered".into()))
    }
}

async fn count_events(pool: &PgPool) -> i64 {
    sqlx::query_scalar(&format!("SELECT count(*) FROM {EVENTS_TABLE}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

// --- push + filter ---

#[sqlx::test(migrator = "warden_event_store::schema::MIGRATOR")]
async fn test_push_then_filter_past_bookmark(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);
    let mut user = make_aggregate("user", "u-1", 0);
    user.append_event("user.added", &Added { name: "ada" })
        .unwrap()
        .append_event("user.changed", &Added { name: "grace" })
        .unwrap();
    let mut aggregates = vec![user];

    // Act
    repo.push_aggregates(&mut aggregates).await.unwrap();

    // Assert
    let pushed = aggregates[0].events();
    assert!(pushed[0].sequence > 0);
    assert_eq!(pushed[0].previous_sequence, 0);
    assert_eq!(pushed[1].previous_sequence, pushed[0].sequence);
    assert!(pushed.iter().all(|e| e.id.is_some() && e.creation_date.is_some()));

    let query = SearchQuery::new()
        .aggregate_type_filter(["user"])
        .latest_sequence_filter(pushed[0].sequence);
    let loaded = repo.filter(&query).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0], pushed[1]);

    let latest = repo
        .latest_sequence(&SearchQuery::new().aggregate_type_filter(["user"]))
        .await
        .unwrap();
    assert_eq!(latest, pushed[1].sequence);
}

#[sqlx::test(migrator = "warden_event_store::schema::MIGRATOR")]
async fn test_payload_bytes_round_trip_unchanged(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let raw = b"{ \"z\": 1,   \"a\": [true, null] }".to_vec();
    let mut user = make_aggregate("user", "u-1", 0);
    user.append_raw_event("user.imported", raw.clone()).unwrap();

    repo.push_aggregates(&mut [user]).await.unwrap();

    let loaded = repo
        .filter(&SearchQuery::new().aggregate_type_filter(["user"]))
        .await
        .unwrap();
    assert_eq!(loaded[0].data.as_deref(), Some(raw.as_slice()));
}

#[sqlx::test(migrator = "warden_event_store::schema::MIGRATOR")]
async fn test_descending_limited_filter(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);
    let mut user = make_aggregate("user", "u-1", 0);
    for _ in 0..3 {
        user.append_event("user.changed", &()).unwrap();
    }
    let mut aggregates = vec![user];
    repo.push_aggregates(&mut aggregates).await.unwrap();
    let newest = aggregates[0].events()[2].sequence;

    // Act
    let loaded = repo
        .filter(
            &SearchQuery::new()
                .aggregate_type_filter(["user"])
                .order_desc()
                .limit(2),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].sequence, newest);
    assert!(loaded[0].sequence > loaded[1].sequence);
}

// --- optimistic concurrency ---

#[sqlx::test(migrator = "warden_event_store::schema::MIGRATOR")]
async fn test_stale_writer_is_rejected(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool.clone());
    let mut first = make_aggregate("user", "u-1", 0);
    first.append_event("user.added", &()).unwrap();
    repo.push_aggregates(&mut [first]).await.unwrap();

    let mut stale = make_aggregate("user", "u-1", 0);
    stale.append_event("user.changed", &()).unwrap();

    // Act
    let result = repo.push_aggregates(&mut [stale]).await;

    // Assert
    match result {
        Err(DomainError::AlreadyExists(_)) => {}
        other => panic!("expected AlreadyExists, got {other:?}"),
    }
    assert_eq!(count_events(&pool).await, 1);
}

#[sqlx::test(migrator = "warden_event_store::schema::MIGRATOR")]
async fn test_writer_with_current_sequence_succeeds(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let mut first = make_aggregate("user", "u-1", 0);
    first.append_event("user.added", &()).unwrap();
    let mut pushed = vec![first];
    repo.push_aggregates(&mut pushed).await.unwrap();
    let head = pushed[0].events()[0].sequence;

    let mut next = make_aggregate("user", "u-1", head);
    next.append_event("user.changed", &()).unwrap();
    let mut next = vec![next];
    repo.push_aggregates(&mut next).await.unwrap();

    assert_eq!(next[0].events()[0].previous_sequence, head);
}

#[sqlx::test(migrator = "warden_event_store::schema::MIGRATOR")]
async fn test_failing_aggregate_rolls_back_whole_batch(pool: PgPool) {
    let repo = PgEventRepository::new(pool.clone());
    let mut fresh = make_aggregate("org", "o-1", 0);
    fresh.append_event("org.added", &()).unwrap();
    let mut stale = make_aggregate("user", "u-1", 99);
    stale.append_event("user.changed", &()).unwrap();

    let result = repo.push_aggregates(&mut [fresh, stale]).await;

    assert!(result.unwrap_err().is_already_exists());
    assert_eq!(count_events(&pool).await, 0);
}

#[sqlx::test(migrator = "warden_event_store::schema::MIGRATOR")]
async fn test_concurrent_writers_from_same_sequence_one_wins(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool.clone());
    let push = |event_type: &'static str| {
        let repo = repo.clone();
        tokio::spawn(async move {
            let mut writer = make_aggregate("user", "x", 0);
            writer.append_event(event_type, &())?;
            repo.push_aggregates(&mut [writer]).await
        })
    };

    // Act
    let first = push("user.added");
    let second = push("user.imported");
    let results = [first.await.unwrap(), second.await.unwrap()];

    // Assert
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(DomainError::AlreadyExists(_))))
        .count();
    assert_eq!((succeeded, rejected), (1, 1), "got {results:?}");
    assert_eq!(count_events(&pool).await, 1);
}

// --- commit order ---

#[sqlx::test(migrator = "warden_event_store::schema::MIGRATOR")]
async fn test_reader_past_bookmark_sees_slow_writer(pool: PgPool) {
    // Arrange: a writer inserts and keeps its transaction open.
    let repo = PgEventRepository::new(pool.clone());
    let all_users = SearchQuery::new().aggregate_type_filter(["user"]);
    let mut slow = pool.begin().await.unwrap();
    sqlx::query(&format!(
        "INSERT INTO {EVENTS_TABLE} (event_type, aggregate_type, aggregate_id, \
         aggregate_version, editor_user, editor_service, resource_owner) \
         VALUES ('user.added', 'user', 'slow', 'v1', 'u-admin', 'import', 'org-1')"
    ))
    .execute(&mut *slow)
    .await
    .unwrap();

    let fast = tokio::spawn({
        let repo = repo.clone();
        async move {
            let mut writer = make_aggregate("user", "fast", 0);
            writer.append_event("user.added", &())?;
            let mut writers = vec![writer];
            repo.push_aggregates(&mut writers).await?;
            Ok::<_, DomainError>(writers[0].events()[0].sequence)
        }
    });

    // Act
    tokio::time::sleep(Duration::from_millis(200)).await;
    let fast_waited = !fast.is_finished();
    let bookmark = repo.latest_sequence(&all_users).await.unwrap();
    slow.commit().await.unwrap();
    let fast_sequence = fast.await.unwrap().unwrap();

    // Assert
    assert!(fast_waited, "second writer committed while the first was open");
    let unseen = repo
        .filter(&all_users.clone().latest_sequence_filter(bookmark))
        .await
        .unwrap();
    let ids: Vec<&str> = unseen.iter().map(|e| e.aggregate_id.as_str()).collect();
    assert_eq!(ids, ["slow", "fast"]);
    assert_eq!(unseen[1].sequence, fast_sequence);
    assert!(unseen[0].sequence < fast_sequence);
}

// --- preconditions ---

#[sqlx::test(migrator = "warden_event_store::schema::MIGRATOR")]
async fn test_precondition_sees_committed_events(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool.clone());
    let registered = SearchQuery::new()
        .aggregate_type_filter(["user"])
        .event_type_filter(["user.added"]);

    let mut first = make_aggregate("user", "u-1", 0);
    first.set_precondition(registered.clone(), no_events);
    first.append_event("user.added", &()).unwrap();
    repo.push_aggregates(&mut [first]).await.unwrap();

    let mut second = make_aggregate("user", "u-2", 0);
    second.set_precondition(registered, no_events);
    second.append_event("user.added", &()).unwrap();

    // Act
    let result = repo.push_aggregates(&mut [second]).await;

    // Assert
    assert_eq!(
        result.unwrap_err(),
        DomainError::PreconditionFailed("already registered".into())
    );
    assert_eq!(count_events(&pool).await, 1);
}

// --- validation ---

#[sqlx::test(migrator = "warden_event_store::schema::MIGRATOR")]
async fn test_query_without_aggregate_types_is_rejected(pool: PgPool) {
    let repo = PgEventRepository::new(pool);

    let result = repo
        .filter(&SearchQuery::new().event_type_filter(["user.added"]))
        .await;

    assert!(result.unwrap_err().is_precondition_failed());
}

#[sqlx::test(migrator = "warden_event_store::schema::MIGRATOR")]
async fn test_health_succeeds_on_live_pool(pool: PgPool) {
    let repo = PgEventRepository::new(pool);

    assert!(repo.health().await.is_ok());
}
