//! Warden Spooler: drives projection handlers over the event log.
//!
//! A fixed pool of workers takes handlers off a shared queue, leases the
//! handler's view cluster-wide, folds every event past the view's bookmark
//! and puts the handler back on the queue after a pacing delay.

pub mod config;
mod lease;
pub mod policy;
pub mod projection;
pub mod registry;
mod spooled_handler;
pub mod spooler;

pub use config::{HandlerConfig, HandlerSettings, SpoolerConfig};
pub use projection::ProjectionBase;
pub use registry::HandlerRegistry;
pub use spooled_handler::CycleOutcome;
pub use spooler::{Spooler, SpoolerHandle};
