//! The `aggregate_heads` view: latest sequence and event per aggregate.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, instrument};
use warden_core::error::DomainError;
use warden_core::event::Event;
use warden_core::handler::Handler;
use warden_core::query::SearchQuery;
use warden_spooler::ProjectionBase;

/// View name in the bookkeeping tables.
pub const VIEW_NAME: &str = "aggregate_heads";

// Replaying an event never moves a head backwards.
const UPSERT_HEAD: &str = r"
INSERT INTO projections.aggregate_heads
    (aggregate_type, aggregate_id, resource_owner, head_sequence, last_event_type, last_event_date)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (aggregate_type, aggregate_id) DO UPDATE SET
    resource_owner = EXCLUDED.resource_owner,
    head_sequence = EXCLUDED.head_sequence,
    last_event_type = EXCLUDED.last_event_type,
    last_event_date = EXCLUDED.last_event_date
WHERE aggregate_heads.head_sequence < EXCLUDED.head_sequence
";

const SELECT_HEAD: &str = r"
SELECT aggregate_type, aggregate_id, resource_owner, head_sequence, last_event_type, last_event_date
FROM projections.aggregate_heads
WHERE aggregate_type = $1 AND aggregate_id = $2
";

/// Latest state of one aggregate as seen by the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct AggregateHead {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub resource_owner: String,
    pub head_sequence: i64,
    pub last_event_type: String,
    pub last_event_date: DateTime<Utc>,
}

/// Parameters of one head upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeadUpdate<'a> {
    aggregate_type: &'a str,
    aggregate_id: &'a str,
    resource_owner: &'a str,
    head_sequence: i64,
    last_event_type: &'a str,
    last_event_date: DateTime<Utc>,
}

impl<'a> HeadUpdate<'a> {
    fn from_event(event: &'a Event) -> Result<Self, DomainError> {
        let head_sequence = i64::try_from(event.sequence).map_err(|_| {
            DomainError::Internal(format!("sequence {} out of range", event.sequence))
        })?;
        let last_event_date = event.creation_date.ok_or_else(|| {
            DomainError::Internal(format!("event {} has no creation date", event.sequence))
        })?;
        Ok(Self {
            aggregate_type: event.aggregate_type.as_str(),
            aggregate_id: &event.aggregate_id,
            resource_owner: &event.resource_owner,
            head_sequence,
            last_event_type: event.event_type.as_str(),
            last_event_date,
        })
    }
}

/// Keeps `projections.aggregate_heads` in step with the log.
#[derive(Debug, Clone)]
pub struct AggregateHeads {
    base: ProjectionBase,
    pool: PgPool,
}

impl AggregateHeads {
    /// Creates the view over the aggregate types `base` follows.
    #[must_use]
    pub fn new(base: ProjectionBase, pool: PgPool) -> Self {
        Self { base, pool }
    }

    /// The head of one aggregate.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if the view has not seen the
    /// aggregate, or `DomainError::Internal` on storage failure.
    pub async fn head(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<AggregateHead, DomainError> {
        let row: Option<AggregateHead> = sqlx::query_as(SELECT_HEAD)
            .bind(aggregate_type)
            .bind(aggregate_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::Internal(format!("unable to load aggregate head: {e}")))?;
        row.ok_or_else(|| {
            DomainError::NotFound(format!("aggregate {aggregate_type}/{aggregate_id}"))
        })
    }
}

#[async_trait]
impl Handler for AggregateHeads {
    fn view_model(&self) -> &str {
        self.base.view_name()
    }

    async fn event_query(&self) -> Result<SearchQuery, DomainError> {
        self.base.event_query().await
    }

    #[instrument(skip(self, event), fields(sequence = event.sequence, aggregate_id = %event.aggregate_id))]
    async fn reduce(&self, event: &Event) -> Result<(), DomainError> {
        let update = HeadUpdate::from_event(event)?;
        sqlx::query(UPSERT_HEAD)
            .bind(update.aggregate_type)
            .bind(update.aggregate_id)
            .bind(update.resource_owner)
            .bind(update.head_sequence)
            .bind(update.last_event_type)
            .bind(update.last_event_date)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::Internal(format!("unable to store aggregate head: {e}")))?;
        debug!("aggregate head stored");
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
