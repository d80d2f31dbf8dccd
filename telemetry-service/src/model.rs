use telemetry_client::domain::{
    DeviceClass, MeterLiveState, MeterReading, VehicleLiveState, VehicleReading,
};
use time::OffsetDateTime;

/// A single validated reading from either device class.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Vehicle(VehicleReading),
    Meter(MeterReading),
}

impl Reading {
    pub fn device_class(&self) -> DeviceClass {
        match self {
            Self::Vehicle(_) => DeviceClass::Vehicle,
            Self::Meter(_) => DeviceClass::Meter,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            Self::Vehicle(v) => &v.vehicle_id,
            Self::Meter(m) => &m.meter_id,
        }
    }

    pub fn ts(&self) -> OffsetDateTime {
        match self {
            Self::Vehicle(v) => v.ts,
            Self::Meter(m) => m.ts,
        }
    }

    /// The live-state row this reading overwrites.
    pub fn live_state(&self, updated_at: OffsetDateTime) -> LiveState {
        match self {
            Self::Vehicle(v) => LiveState::Vehicle(VehicleLiveState::from_reading(v, updated_at)),
            Self::Meter(m) => LiveState::Meter(MeterLiveState::from_reading(m, updated_at)),
        }
    }
}

impl From<VehicleReading> for Reading {
    fn from(v: VehicleReading) -> Self {
        Self::Vehicle(v)
    }
}

impl From<MeterReading> for Reading {
    fn from(m: MeterReading) -> Self {
        Self::Meter(m)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveState {
    Vehicle(VehicleLiveState),
    Meter(MeterLiveState),
}

/// A reading as appended to history, tagged with its content fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub event_id: String,
    pub reading: Reading,
}

impl HistoryRow {
    pub fn new(reading: Reading) -> Self {
        Self {
            event_id: event_id(&reading),
            reading,
        }
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    let len = s.len() as u32;
    hasher.update(&len.to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_f64(hasher: &mut blake3::Hasher, v: f64) {
    hasher.update(&v.to_bits().to_le_bytes());
}

/// Deterministic id over every field of a reading.
///
/// Two submissions of the same measurement hash to the same id, so a retried
/// ingestion can be recognised at the history layer.
pub fn event_id(reading: &Reading) -> String {
    let mut h = blake3::Hasher::new();
    hash_str(&mut h, reading.device_class().as_str());
    h.update(&reading.ts().unix_timestamp_nanos().to_le_bytes());
    match reading {
        Reading::Vehicle(v) => {
            hash_str(&mut h, &v.vehicle_id);
            hash_f64(&mut h, v.soc);
            hash_f64(&mut h, v.kwh_delivered_dc);
            hash_f64(&mut h, v.battery_temp);
        }
        Reading::Meter(m) => {
            hash_str(&mut h, &m.meter_id);
            hash_f64(&mut h, m.kwh_consumed_ac);
            hash_f64(&mut h, m.voltage);
        }
    }
    h.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn vehicle(id: &str, kwh: f64) -> VehicleReading {
        VehicleReading {
            vehicle_id: id.to_string(),
            soc: 80.0,
            kwh_delivered_dc: kwh,
            battery_temp: 30.0,
            ts: datetime!(2024-01-01 00:00:00 UTC),
        }
    }

    #[test]
    fn event_id_is_deterministic() {
        let a = HistoryRow::new(vehicle("V1", 10.0).into());
        let b = HistoryRow::new(vehicle("V1", 10.0).into());
        assert_eq!(a.event_id, b.event_id);
        assert_eq!(a.event_id.len(), 64);
    }

    #[test]
    fn event_id_changes_with_any_field() {
        let base = event_id(&vehicle("V1", 10.0).into());
        assert_ne!(base, event_id(&vehicle("V2", 10.0).into()));
        assert_ne!(base, event_id(&vehicle("V1", 10.5).into()));

        let mut later = vehicle("V1", 10.0);
        later.ts = datetime!(2024-01-01 00:00:01 UTC);
        assert_ne!(base, event_id(&later.into()));
    }

    #[test]
    fn event_id_separates_device_classes() {
        let m = MeterReading {
            meter_id: "X".to_string(),
            kwh_consumed_ac: 1.0,
            voltage: 230.0,
            ts: datetime!(2024-01-01 00:00:00 UTC),
        };
        let v = vehicle("X", 1.0);
        assert_ne!(event_id(&m.into()), event_id(&v.into()));
    }

    #[test]
    fn live_state_copies_latest_values() {
        let updated_at = datetime!(2024-01-02 00:00:00 UTC);
        let reading: Reading = vehicle("V1", 7.5).into();
        match reading.live_state(updated_at) {
            LiveState::Vehicle(s) => {
                assert_eq!(s.vehicle_id, "V1");
                assert_eq!(s.last_kwh_delivered_dc, 7.5);
                assert_eq!(s.soc, 80.0);
                assert_eq!(s.updated_at, updated_at);
            }
            other => panic!("unexpected live state {other:?}"),
        }
    }
}
