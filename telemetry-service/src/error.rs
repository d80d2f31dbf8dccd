use std::fmt;

use telemetry_client::domain::DeviceClass;

/// Failures surfaced by the ingestion, analytics and live-state paths.
#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    /// A reading reached the core without a usable device identifier.
    #[error("invalid reading: {0}")]
    InvalidReading(String),
    /// The requested analytics window reaches outside the representable time range.
    #[error("invalid window: {0}")]
    InvalidWindow(String),
    /// The backing store failed or could not be reached. Nothing was committed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("{0}")]
    NotFound(NotFound),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotFound {
    /// No vehicle readings inside the analytics window.
    VehicleActivity {
        vehicle_id: String,
        window: time::Duration,
    },
    LiveState {
        device_class: DeviceClass,
        device_id: String,
    },
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VehicleActivity { vehicle_id, window } => write!(
                f,
                "no data found for vehicle {vehicle_id} in the last {} hours",
                window.whole_hours()
            ),
            Self::LiveState {
                device_class,
                device_id,
            } => write!(f, "no live state for {device_class} {device_id}"),
        }
    }
}

impl From<sqlx::Error> for TelemetryError {
    fn from(e: sqlx::Error) -> Self {
        TelemetryError::StorageUnavailable(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, TelemetryError>;
