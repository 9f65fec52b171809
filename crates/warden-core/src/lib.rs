//! Warden Core: event log and projection contracts.
//!
//! This crate defines the event and aggregate model, the declarative query
//! language, and the traits the storage engine and the spooler are built
//! on. It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod event;
pub mod handler;
pub mod lock;
pub mod query;
pub mod repository;
pub mod sdk;
pub mod view;
