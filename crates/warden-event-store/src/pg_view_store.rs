//! `PostgreSQL` implementation of the `ViewStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use warden_core::error::DomainError;
use warden_core::event::{Event, Sequence};
use warden_core::view::{CurrentSequence, FailedEvent, ViewStore};

use crate::error::internal;

const SELECT_CURRENT_SEQUENCE: &str = r"
SELECT view_name, current_sequence, event_timestamp, last_successful_spooler_run
FROM projections.current_sequences
WHERE view_name = $1
";

const SELECT_ALL_CURRENT_SEQUENCES: &str = r"
SELECT view_name, current_sequence, event_timestamp, last_successful_spooler_run
FROM projections.current_sequences
ORDER BY view_name
";

// Both SET expressions read the old row, so the timestamp follows the
// sequence only when the sequence moves forward.
const UPSERT_CURRENT_SEQUENCE: &str = r"
INSERT INTO projections.current_sequences (view_name, current_sequence, event_timestamp)
VALUES ($1, $2, $3)
ON CONFLICT (view_name) DO UPDATE SET
    current_sequence = GREATEST(current_sequences.current_sequence, EXCLUDED.current_sequence),
    event_timestamp = CASE
        WHEN EXCLUDED.current_sequence > current_sequences.current_sequence
            THEN EXCLUDED.event_timestamp
        ELSE current_sequences.event_timestamp
    END
";

const TOUCH_SPOOLER_RUN: &str = r"
INSERT INTO projections.current_sequences (view_name, last_successful_spooler_run)
VALUES ($1, now())
ON CONFLICT (view_name) DO UPDATE SET last_successful_spooler_run = now()
";

const SELECT_FAILED_EVENT: &str = r"
SELECT failure_count, err_msg
FROM projections.failed_events
WHERE view_name = $1 AND failed_sequence = $2
";

const UPSERT_FAILED_EVENT: &str = r"
INSERT INTO projections.failed_events (view_name, failed_sequence, failure_count, err_msg)
VALUES ($1, $2, $3, $4)
ON CONFLICT (view_name, failed_sequence) DO UPDATE SET
    failure_count = EXCLUDED.failure_count,
    err_msg = EXCLUDED.err_msg
";

#[derive(Debug, sqlx::FromRow)]
struct CurrentSequenceRow {
    view_name: String,
    current_sequence: i64,
    event_timestamp: Option<DateTime<Utc>>,
    last_successful_spooler_run: Option<DateTime<Utc>>,
}

impl TryFrom<CurrentSequenceRow> for CurrentSequence {
    type Error = DomainError;

    fn try_from(row: CurrentSequenceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            current_sequence: from_bigint(row.current_sequence)?,
            view_name: row.view_name,
            event_timestamp: row.event_timestamp,
            last_successful_spooler_run: row.last_successful_spooler_run,
        })
    }
}

fn from_bigint(value: i64) -> Result<u64, DomainError> {
    u64::try_from(value).map_err(|_| DomainError::Internal(format!("negative counter {value}")))
}

fn to_bigint(value: u64) -> Result<i64, DomainError> {
    i64::try_from(value).map_err(|_| DomainError::InvalidArgument(format!("{value} out of range")))
}

/// Projection bookkeeping backed by the `projections` schema.
#[derive(Debug, Clone)]
pub struct PgViewStore {
    pool: PgPool,
}

impl PgViewStore {
    /// Creates a new `PgViewStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ViewStore for PgViewStore {
    async fn latest_sequence(&self, view_name: &str) -> Result<CurrentSequence, DomainError> {
        let row: Option<CurrentSequenceRow> = sqlx::query_as(SELECT_CURRENT_SEQUENCE)
            .bind(view_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| internal("unable to load current sequence", &e))?;
        row.map_or_else(
            || Ok(CurrentSequence::initial(view_name)),
            CurrentSequence::try_from,
        )
    }

    async fn process_sequence(&self, view_name: &str, event: &Event) -> Result<(), DomainError> {
        sqlx::query(UPSERT_CURRENT_SEQUENCE)
            .bind(view_name)
            .bind(to_bigint(event.sequence)?)
            .bind(event.creation_date)
            .execute(&self.pool)
            .await
            .map_err(|e| internal("unable to store current sequence", &e))?;
        Ok(())
    }

    async fn latest_failed_event(
        &self,
        view_name: &str,
        sequence: Sequence,
    ) -> Result<FailedEvent, DomainError> {
        let row: Option<(i64, String)> = sqlx::query_as(SELECT_FAILED_EVENT)
            .bind(view_name)
            .bind(to_bigint(sequence)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| internal("unable to load failed event", &e))?;

        let mut failed = FailedEvent::new(view_name, sequence);
        if let Some((failure_count, err_msg)) = row {
            failed.failure_count = from_bigint(failure_count)?;
            failed.err_msg = err_msg;
        }
        Ok(failed)
    }

    async fn process_failed_event(&self, failed_event: &FailedEvent) -> Result<(), DomainError> {
        sqlx::query(UPSERT_FAILED_EVENT)
            .bind(&failed_event.view_name)
            .bind(to_bigint(failed_event.failed_sequence)?)
            .bind(to_bigint(failed_event.failure_count)?)
            .bind(&failed_event.err_msg)
            .execute(&self.pool)
            .await
            .map_err(|e| internal("unable to store failed event", &e))?;
        Ok(())
    }

    async fn update_spooler_run_timestamp(&self, view_name: &str) -> Result<(), DomainError> {
        sqlx::query(TOUCH_SPOOLER_RUN)
            .bind(view_name)
            .execute(&self.pool)
            .await
            .map_err(|e| internal("unable to store spooler run", &e))?;
        Ok(())
    }

    async fn current_sequences(&self) -> Result<Vec<CurrentSequence>, DomainError> {
        let rows: Vec<CurrentSequenceRow> = sqlx::query_as(SELECT_ALL_CURRENT_SEQUENCES)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| internal("unable to list current sequences", &e))?;
        rows.into_iter().map(CurrentSequence::try_from).collect()
    }
}
