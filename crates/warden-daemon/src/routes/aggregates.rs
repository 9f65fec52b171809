//! Read access to the `aggregate_heads` view.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use tracing::instrument;
use warden_core::error::DomainError;

use crate::error::ApiError;
use crate::projections::aggregate_heads::AggregateHead;
use crate::state::AppState;

/// GET /aggregates/{aggregate_type}/{aggregate_id}
#[instrument(skip(state))]
async fn get_head(
    State(state): State<AppState>,
    Path((aggregate_type, aggregate_id)): Path<(String, String)>,
) -> Result<Json<AggregateHead>, ApiError> {
    let heads = state.aggregate_heads.as_ref().ok_or_else(|| {
        DomainError::NotFound("the aggregate_heads view is not enabled".into())
    })?;
    Ok(Json(heads.head(&aggregate_type, &aggregate_id).await?))
}

/// Returns the router for aggregate heads.
pub fn router() -> Router<AppState> {
    Router::new().route("/{aggregate_type}/{aggregate_id}", get(get_head))
}
