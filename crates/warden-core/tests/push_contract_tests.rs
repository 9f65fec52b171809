//! Write-path rules every `EventRepository` honours, checked on the in-memory
//! implementation.

use warden_core::aggregate::{Aggregate, AggregateCreator, EditorContext};
use warden_core::error::DomainError;
use warden_core::event::Event;
use warden_core::query::SearchQuery;
use warden_core::repository::EventRepository;
use warden_test_support::InMemoryEventRepository;

fn creator() -> (AggregateCreator, EditorContext) {
    (
        AggregateCreator::new("admin-api"),
        EditorContext {
            user: "u-admin".into(),
            resource_owner: "org-1".into(),
        },
    )
}

fn aggregate(aggregate_type: &str, id: &str, latest_sequence: u64) -> Aggregate {
    let (creator, editor) = creator();
    creator
        .new_aggregate(&editor, id, aggregate_type, "v1", latest_sequence)
        .unwrap()
}

fn no_existing_user(events: &[Event]) -> Result<(), DomainError> {
    if events.is_empty() {
        Ok(())
    } else {
        Err(DomainError::PreconditionFailed("user already registered".into()))
    }
}

#[tokio::test]
async fn test_push_assigns_sequences_and_chains_previous_sequence() {
    // Arrange
    let repo = InMemoryEventRepository::new();
    let mut user = aggregate("user", "u-1", 0);
    user.append_event("user.added", &()).unwrap();
    user.append_event("user.changed", &()).unwrap();
    let mut aggregates = vec![user];

    // Act
    repo.push_aggregates(&mut aggregates).await.unwrap();

    // Assert
    let events = aggregates[0].events();
    assert_eq!(events[0].sequence, 1);
    assert_eq!(events[0].previous_sequence, 0);
    assert_eq!(events[1].sequence, 2);
    assert_eq!(events[1].previous_sequence, 1);
    assert!(events.iter().all(|e| e.id.is_some() && e.creation_date.is_some()));
}

#[tokio::test]
async fn test_stale_writer_gets_already_exists() {
    // Arrange
    let repo = InMemoryEventRepository::new();
    let mut first = aggregate("user", "u-1", 0);
    first.append_event("user.added", &()).unwrap();
    repo.push_aggregates(&mut [first]).await.unwrap();

    let mut stale = aggregate("user", "u-1", 0);
    stale.append_event("user.changed", &()).unwrap();

    // Act
    let result = repo.push_aggregates(&mut [stale]).await;

    // Assert
    match result {
        Err(DomainError::AlreadyExists(_)) => {}
        other => panic!("expected AlreadyExists, got {other:?}"),
    }
    assert_eq!(repo.committed_events().len(), 1);
}

#[tokio::test]
async fn test_failed_batch_commits_nothing() {
    // Arrange
    let repo = InMemoryEventRepository::new();
    let mut fresh = aggregate("org", "o-1", 0);
    fresh.append_event("org.added", &()).unwrap();
    let mut stale = aggregate("user", "u-1", 5);
    stale.append_event("user.changed", &()).unwrap();
    let mut batch = vec![fresh, stale];

    // Act
    let result = repo.push_aggregates(&mut batch).await;

    // Assert
    assert!(result.unwrap_err().is_already_exists());
    assert!(repo.committed_events().is_empty());
    assert_eq!(batch[0].events()[0].sequence, 0);
}

#[tokio::test]
async fn test_precondition_rejects_second_registration() {
    // Arrange
    let repo = InMemoryEventRepository::new();
    let registered = SearchQuery::new()
        .aggregate_type_filter(["user"])
        .event_type_filter(["user.added"]);

    let mut first = aggregate("user", "u-1", 0);
    first.set_precondition(registered.clone(), no_existing_user);
    first.append_event("user.added", &()).unwrap();
    repo.push_aggregates(&mut [first]).await.unwrap();

    let mut second = aggregate("user", "u-2", 0);
    second.set_precondition(registered, no_existing_user);
    second.append_event("user.added", &()).unwrap();

    // Act
    let result = repo.push_aggregates(&mut [second]).await;

    // Assert
    assert_eq!(
        result.unwrap_err(),
        DomainError::PreconditionFailed("user already registered".into())
    );
    assert_eq!(repo.committed_events().len(), 1);
}

#[tokio::test]
async fn test_invalid_aggregate_is_rejected_before_storage() {
    let repo = InMemoryEventRepository::new();
    let mut incomplete = Aggregate::new("u-1", "user", "v1", 0).unwrap();
    incomplete.append_event("user.added", &()).unwrap();

    let result = repo.push_aggregates(&mut [incomplete]).await;

    assert!(result.unwrap_err().is_precondition_failed());
    assert!(repo.committed_events().is_empty());
}

#[tokio::test]
async fn test_filter_rejects_query_without_aggregate_types() {
    let repo = InMemoryEventRepository::new();

    let result = repo
        .filter(&SearchQuery::new().event_type_filter(["user.added"]))
        .await;

    assert!(result.unwrap_err().is_precondition_failed());
    assert_eq!(repo.filter_calls(), 0);
}

#[tokio::test]
async fn test_descending_filter_with_limit_returns_newest_first() {
    // Arrange
    let repo = InMemoryEventRepository::new();
    let mut user = aggregate("user", "u-1", 0);
    for _ in 0..3 {
        user.append_event("user.changed", &()).unwrap();
    }
    repo.push_aggregates(&mut [user]).await.unwrap();

    // Act
    let events = repo
        .filter(
            &SearchQuery::new()
                .aggregate_type_filter(["user"])
                .order_desc()
                .limit(2),
        )
        .await
        .unwrap();

    // Assert
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![3, 2]);
}

#[tokio::test]
async fn test_latest_sequence_is_zero_for_empty_log() {
    let repo = InMemoryEventRepository::new();

    let latest = repo
        .latest_sequence(&SearchQuery::new().aggregate_type_filter(["user"]))
        .await
        .unwrap();

    assert_eq!(latest, 0);
}
