use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use telemetry_client::domain::{MeterLiveState, VehicleLiveState};

use super::{ApiError, AppState};
use crate::analytics::PerformanceReport;

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub hours: Option<i64>,
}

/// GET /v1/analytics/performance/:vehicle_id[?hours=N]
pub async fn performance(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<Json<PerformanceReport>, ApiError> {
    let Query(query) = query?;
    let window = match query.hours {
        None => state.analytics.default_window(),
        Some(h) if (1..=state.max_window_hours).contains(&h) => time::Duration::hours(h),
        Some(h) => {
            return Err(ApiError::bad_request(format!(
                "hours must be within [1, {}], got {h}",
                state.max_window_hours
            )))
        }
    };

    let report = state.analytics.performance(&vehicle_id, window).await?;
    Ok(Json(report))
}

pub async fn vehicle_live(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<String>,
) -> Result<Json<VehicleLiveState>, ApiError> {
    Ok(Json(state.live.vehicle(&vehicle_id).await?))
}

pub async fn meter_live(
    State(state): State<Arc<AppState>>,
    Path(meter_id): Path<String>,
) -> Result<Json<MeterLiveState>, ApiError> {
    Ok(Json(state.live.meter(&meter_id).await?))
}
