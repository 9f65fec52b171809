//! Shared test doubles for the Warden event log and spooler.

mod clock;
mod locker;
mod repository;
mod view_store;

pub use clock::{FixedClock, ManualClock};
pub use locker::InMemoryLocker;
pub use repository::{FailingEventRepository, InMemoryEventRepository};
pub use view_store::InMemoryViewStore;
