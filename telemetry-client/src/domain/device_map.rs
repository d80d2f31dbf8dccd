use time::OffsetDateTime;

/// A meter assigned to power a vehicle. Unique on `(vehicle_id, meter_id)`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct VehicleMeterMap {
    pub vehicle_id: String,
    pub meter_id: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub assigned_at: OffsetDateTime,
}
