//! HTTP routes.

pub mod aggregates;
pub mod health;
pub mod projections;

use axum::Router;

use crate::state::AppState;

/// The full router served by the daemon.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(projections::router())
        .nest("/aggregates", aggregates::router())
        .with_state(state)
}
