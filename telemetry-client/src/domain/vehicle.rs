use time::OffsetDateTime;

/// One raw vehicle sample as stored in `vehicle_telemetry_history`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct VehicleReading {
    pub vehicle_id: String,
    pub soc: f64,
    pub kwh_delivered_dc: f64,
    pub battery_temp: f64,
    #[cfg_attr(feature = "serde", serde(rename = "timestamp", with = "time::serde::rfc3339"))]
    pub ts: OffsetDateTime,
}

/// Most recent values for a vehicle, one row per `vehicle_id`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct VehicleLiveState {
    pub vehicle_id: String,
    pub soc: f64,
    pub battery_temp: f64,
    pub last_kwh_delivered_dc: f64,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub updated_at: OffsetDateTime,
}

impl VehicleLiveState {
    pub fn from_reading(r: &VehicleReading, updated_at: OffsetDateTime) -> Self {
        Self {
            vehicle_id: r.vehicle_id.clone(),
            soc: r.soc,
            battery_temp: r.battery_temp,
            last_kwh_delivered_dc: r.kwh_delivered_dc,
            updated_at,
        }
    }
}
