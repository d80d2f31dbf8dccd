use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use telemetry_client::domain::{MeterReading, VehicleReading};
use time::OffsetDateTime;

use super::{ApiError, AppState};
use crate::model::Reading;
use crate::store::AppendOutcome;
use crate::validation::validate_reading;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingVehicleReading {
    pub vehicle_id: String,
    pub soc: f64,
    pub kwh_delivered_dc: f64,
    pub battery_temp: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl From<IncomingVehicleReading> for VehicleReading {
    fn from(i: IncomingVehicleReading) -> Self {
        VehicleReading {
            vehicle_id: i.vehicle_id,
            soc: i.soc,
            kwh_delivered_dc: i.kwh_delivered_dc,
            battery_temp: i.battery_temp,
            ts: i.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMeterReading {
    pub meter_id: String,
    pub kwh_consumed_ac: f64,
    pub voltage: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl From<IncomingMeterReading> for MeterReading {
    fn from(i: IncomingMeterReading) -> Self {
        MeterReading {
            meter_id: i.meter_id,
            kwh_consumed_ac: i.kwh_consumed_ac,
            voltage: i.voltage,
            ts: i.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
}

pub async fn ingest_vehicle(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IncomingVehicleReading>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let Json(payload) = payload?;
    metrics::counter!("http_ingest_requests_total", "device_class" => "vehicle").increment(1);
    submit(&state, VehicleReading::from(payload).into()).await
}

pub async fn ingest_meter(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IncomingMeterReading>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let Json(payload) = payload?;
    metrics::counter!("http_ingest_requests_total", "device_class" => "meter").increment(1);
    submit(&state, MeterReading::from(payload).into()).await
}

async fn submit(
    state: &AppState,
    reading: Reading,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    validate_reading(&reading)?;

    let outcome = state
        .ingestion
        .ingest_within(reading, state.request_timeout)
        .await?;

    Ok(match outcome {
        AppendOutcome::Appended => (StatusCode::CREATED, Json(IngestResponse { status: "appended" })),
        AppendOutcome::Duplicate => (StatusCode::OK, Json(IngestResponse { status: "duplicate" })),
    })
}
