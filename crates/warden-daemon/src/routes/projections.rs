//! Projection status endpoint.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use warden_core::view::CurrentSequence;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /projections
///
/// Bookmark and last spooler run of every view, ordered by view name.
async fn list_projections(
    State(state): State<AppState>,
) -> Result<Json<Vec<CurrentSequence>>, ApiError> {
    Ok(Json(state.view_store.current_sequences().await?))
}

/// Returns the projection status router.
pub fn router() -> Router<AppState> {
    Router::new().route("/projections", get(list_projections))
}
