//! `PostgreSQL` storage for Warden: the event log, the lease table and the
//! projection bookkeeping tables.

mod error;
pub mod pg_event_repository;
pub mod pg_locker;
pub mod pg_view_store;
pub mod schema;
pub mod sql;

pub use pg_event_repository::PgEventRepository;
pub use pg_locker::PgLocker;
pub use pg_view_store::PgViewStore;
