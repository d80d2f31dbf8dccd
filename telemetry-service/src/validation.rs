use telemetry_client::domain::{DeviceClass, MeterReading, VehicleReading};
use time::macros::datetime;
use time::OffsetDateTime;

use crate::model::Reading;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("invalid {device_class} reading: {reason}")]
pub struct ValidationError {
    pub device_class: DeviceClass,
    pub reason: String,
}

fn reject(device_class: DeviceClass, reason: impl Into<String>) -> ValidationError {
    ValidationError {
        device_class,
        reason: reason.into(),
    }
}

fn check_ts(device_class: DeviceClass, ts: OffsetDateTime) -> Result<(), ValidationError> {
    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if ts < min_ts || ts > max_ts {
        return Err(reject(device_class, "timestamp out of allowed range"));
    }
    Ok(())
}

fn check_finite(device_class: DeviceClass, field: &str, v: f64) -> Result<(), ValidationError> {
    if !v.is_finite() {
        return Err(reject(device_class, format!("{field} must be a finite number")));
    }
    Ok(())
}

/// Pure validation of a `VehicleReading`.
///
/// Rules:
/// - vehicleId must not be empty.
/// - soc must lie within [0, 100].
/// - kwhDeliveredDc must be positive.
/// - batteryTemp must be finite.
/// - ts must be within [2000-01-01, 2100-01-01].
pub fn validate_vehicle_reading(r: &VehicleReading) -> Result<(), ValidationError> {
    let class = DeviceClass::Vehicle;

    if r.vehicle_id.trim().is_empty() {
        return Err(reject(class, "vehicleId must not be empty"));
    }
    check_finite(class, "soc", r.soc)?;
    check_finite(class, "kwhDeliveredDc", r.kwh_delivered_dc)?;
    check_finite(class, "batteryTemp", r.battery_temp)?;

    if !(0.0..=100.0).contains(&r.soc) {
        return Err(reject(class, "soc must be within [0, 100]"));
    }
    if r.kwh_delivered_dc <= 0.0 {
        return Err(reject(class, "kwhDeliveredDc must be positive"));
    }

    check_ts(class, r.ts)
}

/// Pure validation of a `MeterReading`.
///
/// Rules:
/// - meterId must not be empty.
/// - kwhConsumedAc and voltage must be positive.
/// - ts must be within the same sanity window as vehicle readings.
pub fn validate_meter_reading(r: &MeterReading) -> Result<(), ValidationError> {
    let class = DeviceClass::Meter;

    if r.meter_id.trim().is_empty() {
        return Err(reject(class, "meterId must not be empty"));
    }
    check_finite(class, "kwhConsumedAc", r.kwh_consumed_ac)?;
    check_finite(class, "voltage", r.voltage)?;

    if r.kwh_consumed_ac <= 0.0 {
        return Err(reject(class, "kwhConsumedAc must be positive"));
    }
    if r.voltage <= 0.0 {
        return Err(reject(class, "voltage must be positive"));
    }

    check_ts(class, r.ts)
}

pub fn validate_reading(reading: &Reading) -> Result<(), ValidationError> {
    let res = match reading {
        Reading::Vehicle(v) => validate_vehicle_reading(v),
        Reading::Meter(m) => validate_meter_reading(m),
    };
    if res.is_err() {
        metrics::counter!("validation_rejected_total", "device_class" => reading.device_class().as_str())
            .increment(1);
    }
    res
}
