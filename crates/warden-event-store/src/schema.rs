//! Database schema: the event table name and the embedded migrations.
//!
//! The SQL lives in the workspace `migrations/` directory; both
//! `sqlx::test` and [`MIGRATOR`] read it from there.

use sqlx::migrate::Migrator;

/// The append-only event log.
pub const EVENTS_TABLE: &str = "eventstore.events";

/// Migrations creating the event log and the `projections` schema.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
