//! Warden daemon: runs the spooler and serves its status over HTTP.

pub mod config;
pub mod error;
pub mod projections;
pub mod routes;
pub mod state;
