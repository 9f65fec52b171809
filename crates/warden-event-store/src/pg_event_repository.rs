//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use warden_core::aggregate::Aggregate;
use warden_core::error::DomainError;
use warden_core::event::{AggregateType, Event, EventType, Sequence, Version};
use warden_core::query::{Columns, SearchQuery};
use warden_core::repository::EventRepository;

use crate::error::{internal, on_insert};
use crate::sql::{self, Statement};

/// Appends one event if its aggregate is still at the expected sequence.
///
/// `$1..$8` are the event's columns, `$9` the expected previous sequence
/// (zero for a new aggregate). No row comes back when another writer got
/// there first.
const INSERT_EVENT: &str = r"
INSERT INTO eventstore.events (
    event_type, aggregate_type, aggregate_id, aggregate_version,
    event_data, editor_user, editor_service, resource_owner, previous_sequence
)
SELECT $1, $2, $3, $4, $5, $6, $7, $8,
    (SELECT MAX(event_sequence) FROM eventstore.events
        WHERE aggregate_type = $2 AND aggregate_id = $3)
WHERE COALESCE(
    (SELECT MAX(event_sequence) FROM eventstore.events
        WHERE aggregate_type = $2 AND aggregate_id = $3),
    0) = $9
RETURNING id, event_sequence, previous_sequence, creation_date
";

/// Takes the event log's writer lock until the transaction ends. Pushes
/// therefore commit in the order their sequences were drawn.
const SERIALIZE_WRITERS: &str = "SELECT eventstore.serialize_writers()";

const SNAPSHOT_READ: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    creation_date: DateTime<Utc>,
    event_type: String,
    event_sequence: i64,
    previous_sequence: Option<i64>,
    event_data: Option<Vec<u8>>,
    editor_service: String,
    editor_user: String,
    resource_owner: String,
    aggregate_type: String,
    aggregate_id: String,
    aggregate_version: String,
}

fn to_sequence(value: i64) -> Result<Sequence, DomainError> {
    Sequence::try_from(value)
        .map_err(|_| DomainError::Internal(format!("negative sequence {value} in log")))
}

fn to_bigint(value: Sequence) -> Result<i64, DomainError> {
    i64::try_from(value)
        .map_err(|_| DomainError::InvalidArgument(format!("sequence {value} out of range")))
}

impl TryFrom<EventRow> for Event {
    type Error = DomainError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let aggregate_version = Version::parse(row.aggregate_version).map_err(|e| {
            DomainError::Internal(format!("stored event {}: {e}", row.event_sequence))
        })?;
        Ok(Self {
            id: Some(row.id),
            creation_date: Some(row.creation_date),
            event_type: EventType::new(row.event_type),
            sequence: to_sequence(row.event_sequence)?,
            previous_sequence: to_sequence(row.previous_sequence.unwrap_or(0))?,
            data: row.event_data,
            editor_service: row.editor_service,
            editor_user: row.editor_user,
            resource_owner: row.resource_owner,
            aggregate_type: AggregateType::new(row.aggregate_type),
            aggregate_id: row.aggregate_id,
            aggregate_version,
        })
    }
}

/// Fields the database assigns on insert.
struct Assigned {
    id: Uuid,
    sequence: Sequence,
    previous_sequence: Sequence,
    creation_date: DateTime<Utc>,
}

async fn load(conn: &mut PgConnection, statement: &Statement) -> Result<Vec<Event>, DomainError> {
    let args = sql::arguments(&statement.values)?;
    let rows: Vec<EventRow> = sqlx::query_as_with::<_, EventRow, _>(&statement.sql, args)
        .fetch_all(conn)
        .await
        .map_err(|e| internal("unable to filter events", &e))?;
    rows.into_iter().map(Event::try_from).collect()
}

async fn max_sequence(conn: &mut PgConnection, statement: &Statement) -> Result<Sequence, DomainError> {
    let args = sql::arguments(&statement.values)?;
    let max: Option<i64> = sqlx::query_scalar_with::<_, Option<i64>, _>(&statement.sql, args)
        .fetch_one(conn)
        .await
        .map_err(|e| internal("unable to load latest sequence", &e))?;
    to_sequence(max.unwrap_or(0))
}

async fn insert_event(
    conn: &mut PgConnection,
    event: &Event,
    expected: Sequence,
) -> Result<Assigned, DomainError> {
    let row: Option<(Uuid, i64, Option<i64>, DateTime<Utc>)> = sqlx::query_as(INSERT_EVENT)
        .bind(event.event_type.as_str())
        .bind(event.aggregate_type.as_str())
        .bind(&event.aggregate_id)
        .bind(event.aggregate_version.as_str())
        .bind(event.data.as_deref())
        .bind(&event.editor_user)
        .bind(&event.editor_service)
        .bind(&event.resource_owner)
        .bind(to_bigint(expected)?)
        .fetch_optional(conn)
        .await
        .map_err(|e| on_insert("unable to append event", &e))?;

    let Some((id, sequence, previous_sequence, creation_date)) = row else {
        return Err(DomainError::AlreadyExists(format!(
            "aggregate {}/{} moved past sequence {expected}",
            event.aggregate_type, event.aggregate_id
        )));
    };
    Ok(Assigned {
        id,
        sequence: to_sequence(sequence)?,
        previous_sequence: to_sequence(previous_sequence.unwrap_or(0))?,
        creation_date,
    })
}

/// PostgreSQL-backed event repository.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens the transaction a read runs in: a read-only snapshot, unless
    /// the query must see the latest committed state.
    async fn begin_read(&self, query: &SearchQuery) -> Result<Transaction<'_, Postgres>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| internal("unable to begin read", &e))?;
        if !query.is_precondition_mode() {
            sqlx::query(SNAPSHOT_READ)
                .execute(&mut *tx)
                .await
                .map_err(|e| internal("unable to begin snapshot read", &e))?;
        }
        Ok(tx)
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn health(&self) -> Result<(), DomainError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| internal("database unreachable", &e))?;
        Ok(())
    }

    #[instrument(skip(self, query), fields(precondition = query.is_precondition_mode()))]
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<Event>, DomainError> {
        let statement = sql::prepare(&query.clone().columns(Columns::Event))?;
        let mut tx = self.begin_read(query).await?;
        let events = load(&mut *tx, &statement).await?;
        tx.commit()
            .await
            .map_err(|e| internal("unable to finish read", &e))?;
        debug!(count = events.len(), "filtered events");
        Ok(events)
    }

    #[instrument(skip(self, query), fields(precondition = query.is_precondition_mode()))]
    async fn latest_sequence(&self, query: &SearchQuery) -> Result<Sequence, DomainError> {
        let statement = sql::prepare(&query.clone().columns(Columns::MaxSequence))?;
        let mut tx = self.begin_read(query).await?;
        let latest = max_sequence(&mut *tx, &statement).await?;
        tx.commit()
            .await
            .map_err(|e| internal("unable to finish read", &e))?;
        Ok(latest)
    }

    #[instrument(skip(self, aggregates), fields(aggregates = aggregates.len()))]
    async fn push_aggregates(&self, aggregates: &mut [Aggregate]) -> Result<(), DomainError> {
        aggregates.iter().try_for_each(Aggregate::validate)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| internal("unable to begin push", &e))?;
        sqlx::query(SERIALIZE_WRITERS)
            .execute(&mut *tx)
            .await
            .map_err(|e| internal("unable to lock event log", &e))?;

        let mut assigned: Vec<Vec<Assigned>> = Vec::with_capacity(aggregates.len());
        for aggregate in aggregates.iter() {
            if let Some(precondition) = aggregate.precondition() {
                let statement = sql::prepare(&precondition.query.clone().columns(Columns::Event))?;
                let loaded = load(&mut *tx, &statement).await?;
                precondition.evaluate(&loaded)?;
            }

            let mut expected = aggregate.latest_sequence();
            let mut written = Vec::with_capacity(aggregate.events().len());
            for event in aggregate.events() {
                let event_assigned = insert_event(&mut *tx, event, expected)
                    .await
                    .inspect_err(|err| {
                        if err.is_already_exists() {
                            warn!(
                                aggregate_type = %aggregate.aggregate_type(),
                                aggregate_id = aggregate.id(),
                                expected,
                                "concurrent write rejected"
                            );
                        }
                    })?;
                expected = event_assigned.sequence;
                written.push(event_assigned);
            }
            assigned.push(written);
        }

        tx.commit()
            .await
            .map_err(|e| on_insert("unable to commit push", &e))?;

        for (aggregate, written) in aggregates.iter_mut().zip(assigned) {
            for (event, assigned) in aggregate.events_mut().iter_mut().zip(written) {
                event.id = Some(assigned.id);
                event.sequence = assigned.sequence;
                event.previous_sequence = assigned.previous_sequence;
                event.creation_date = Some(assigned.creation_date);
            }
        }
        debug!("pushed aggregates");
        Ok(())
    }
}
