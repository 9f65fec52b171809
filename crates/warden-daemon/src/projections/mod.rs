//! Projections shipped with the daemon.

pub mod aggregate_heads;

use std::sync::Arc;

use sqlx::PgPool;
use warden_core::error::DomainError;
use warden_core::view::ViewStore;
use warden_spooler::{HandlerRegistry, ProjectionBase};

use crate::config::DaemonConfig;
use aggregate_heads::AggregateHeads;

/// The registry of every enabled built-in projection, and the
/// `aggregate_heads` view if it is one of them.
///
/// # Errors
///
/// Returns the registry's error if two projections claim one view.
pub fn build_registry(
    config: &DaemonConfig,
    view_store: &Arc<dyn ViewStore>,
    pool: &PgPool,
) -> Result<(HandlerRegistry, Option<Arc<AggregateHeads>>), DomainError> {
    let mut registry = HandlerRegistry::new();
    let types = &config.projections.aggregate_heads;
    if types.is_empty() {
        return Ok((registry, None));
    }

    let base = ProjectionBase::new(
        aggregate_heads::VIEW_NAME,
        types.iter().cloned(),
        config.spooler.handler_settings(aggregate_heads::VIEW_NAME),
        Arc::clone(view_store),
    );
    let heads = Arc::new(AggregateHeads::new(base, pool.clone()));
    registry.register(Arc::clone(&heads) as _)?;
    Ok((registry, Some(heads)))
}
