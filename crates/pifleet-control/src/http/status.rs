use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use tracing::instrument;

use super::{ApiError, ApiResult, AppState};
use crate::monitor::{FleetStatus, StatusFilter};

pub fn router() -> Router<AppState> {
    Router::new().route("/api/status", get(fleet_status))
}

/// `GET /api/status?status=&location=&device=`
///
/// Probes the whole registry; the filters only narrow `devices`.
#[instrument(skip(state))]
async fn fleet_status(
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Json<FleetStatus>> {
    filter
        .status()
        .map_err(|e| ApiError::bad_request("invalid_filter", e))?;
    let status = state.monitor.fleet_status(&state.db, &filter).await?;
    Ok(Json(status))
}
