pub mod device_map;
pub mod meter;
pub mod vehicle;

pub use device_map::VehicleMeterMap;
pub use meter::{MeterLiveState, MeterReading};
pub use vehicle::{VehicleLiveState, VehicleReading};

use std::fmt;

/// The two kinds of device that report telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DeviceClass {
    Vehicle,
    Meter,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vehicle => "vehicle",
            Self::Meter => "meter",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
