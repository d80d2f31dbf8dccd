use time::OffsetDateTime;

/// One raw meter sample as stored in `meter_telemetry_history`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MeterReading {
    pub meter_id: String,
    pub kwh_consumed_ac: f64,
    pub voltage: f64,
    #[cfg_attr(feature = "serde", serde(rename = "timestamp", with = "time::serde::rfc3339"))]
    pub ts: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MeterLiveState {
    pub meter_id: String,
    pub last_kwh_consumed_ac: f64,
    pub voltage: f64,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub updated_at: OffsetDateTime,
}

impl MeterLiveState {
    pub fn from_reading(r: &MeterReading, updated_at: OffsetDateTime) -> Self {
        Self {
            meter_id: r.meter_id.clone(),
            last_kwh_consumed_ac: r.kwh_consumed_ac,
            voltage: r.voltage,
            updated_at,
        }
    }
}
