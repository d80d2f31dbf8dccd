use std::sync::Arc;

use telemetry_client::domain::{DeviceClass, MeterLiveState, VehicleLiveState};

use crate::error::{NotFound, TelemetryError};
use crate::store::LiveStateReader;

/// Current-status lookups served from the live-state rows.
#[derive(Clone)]
pub struct LiveStatusService {
    reader: Arc<dyn LiveStateReader>,
}

impl LiveStatusService {
    pub fn new(reader: Arc<dyn LiveStateReader>) -> Self {
        Self { reader }
    }

    pub async fn vehicle(&self, vehicle_id: &str) -> Result<VehicleLiveState, TelemetryError> {
        self.reader
            .vehicle_live_state(vehicle_id)
            .await?
            .ok_or_else(|| missing(DeviceClass::Vehicle, vehicle_id))
    }

    pub async fn meter(&self, meter_id: &str) -> Result<MeterLiveState, TelemetryError> {
        self.reader
            .meter_live_state(meter_id)
            .await?
            .ok_or_else(|| missing(DeviceClass::Meter, meter_id))
    }
}

fn missing(device_class: DeviceClass, device_id: &str) -> TelemetryError {
    TelemetryError::NotFound(NotFound::LiveState {
        device_class,
        device_id: device_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::IngestionService;
    use crate::store::MemoryTelemetryStore;
    use telemetry_client::domain::MeterReading;
    use time::macros::datetime;

    #[tokio::test]
    async fn returns_latest_meter_state_or_not_found() {
        let store = MemoryTelemetryStore::default();
        let live = LiveStatusService::new(Arc::new(store.clone()));
        let ingest = IngestionService::new(Arc::new(store));

        assert!(matches!(
            live.meter("M1").await,
            Err(TelemetryError::NotFound(NotFound::LiveState { .. }))
        ));

        for voltage in [229.0, 231.5] {
            ingest
                .submit_meter_reading(MeterReading {
                    meter_id: "M1".to_string(),
                    kwh_consumed_ac: 3.0,
                    voltage,
                    ts: datetime!(2024-01-01 00:00:00 UTC),
                })
                .await
                .unwrap();
        }

        let state = live.meter("M1").await.unwrap();
        assert_eq!(state.voltage, 231.5);
        assert!(live.vehicle("M1").await.is_err());
    }
}
