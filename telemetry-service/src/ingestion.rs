use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use telemetry_client::domain::{MeterReading, VehicleReading};

use crate::clock::{Clock, SystemClock};
use crate::error::TelemetryError;
use crate::model::{HistoryRow, Reading};
use crate::store::{AppendOutcome, TelemetryStore, WriteTransaction};

/// Dual-writes each reading to history and live state inside one transaction.
#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn TelemetryStore>,
    clock: Arc<dyn Clock>,
}

impl IngestionService {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn TelemetryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn submit_vehicle_reading(
        &self,
        reading: VehicleReading,
    ) -> Result<AppendOutcome, TelemetryError> {
        self.ingest(reading.into()).await
    }

    pub async fn submit_meter_reading(
        &self,
        reading: MeterReading,
    ) -> Result<AppendOutcome, TelemetryError> {
        self.ingest(reading.into()).await
    }

    /// Append the reading to history and overwrite the device's live state.
    ///
    /// Either both writes commit or neither does.
    pub async fn ingest(&self, reading: Reading) -> Result<AppendOutcome, TelemetryError> {
        let class = reading.device_class();

        if reading.device_id().trim().is_empty() {
            metrics::counter!(
                "telemetry_ingest_failures_total",
                "device_class" => class.as_str(),
                "reason" => "invalid_reading"
            )
            .increment(1);
            return Err(TelemetryError::InvalidReading(format!(
                "{class} reading has an empty device identifier"
            )));
        }

        let started = Instant::now();
        let row = HistoryRow::new(reading);

        match self.write(&row).await {
            Ok(outcome) => {
                metrics::counter!("telemetry_ingested_readings_total", "device_class" => class.as_str())
                    .increment(1);
                metrics::histogram!("telemetry_ingest_latency_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::debug!(
                    device_class = %class,
                    device_id = row.reading.device_id(),
                    event_id = %row.event_id,
                    ?outcome,
                    "reading ingested"
                );
                Ok(outcome)
            }
            Err(e) => {
                metrics::counter!(
                    "telemetry_ingest_failures_total",
                    "device_class" => class.as_str(),
                    "reason" => "storage"
                )
                .increment(1);
                tracing::warn!(
                    error = %e,
                    device_class = %class,
                    device_id = row.reading.device_id(),
                    "ingestion failed, nothing committed"
                );
                Err(e)
            }
        }
    }

    /// Like [`ingest`](Self::ingest) but abandons the call once `deadline` elapses.
    ///
    /// The in-flight transaction is dropped uncommitted, which rolls it back.
    pub async fn ingest_within(
        &self,
        reading: Reading,
        deadline: Duration,
    ) -> Result<AppendOutcome, TelemetryError> {
        let class = reading.device_class();
        match tokio::time::timeout(deadline, self.ingest(reading)).await {
            Ok(res) => res,
            Err(_) => {
                metrics::counter!(
                    "telemetry_ingest_failures_total",
                    "device_class" => class.as_str(),
                    "reason" => "deadline"
                )
                .increment(1);
                tracing::warn!(device_class = %class, ?deadline, "ingestion deadline exceeded");
                Err(TelemetryError::StorageUnavailable(format!(
                    "ingestion deadline of {}ms exceeded",
                    deadline.as_millis()
                )))
            }
        }
    }

    async fn write(&self, row: &HistoryRow) -> Result<AppendOutcome, TelemetryError> {
        let live = row.reading.live_state(self.clock.now());

        let mut tx = self.store.begin().await?;

        let outcome = match tx.append_history(row).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(abort(tx, e).await),
        };
        if let Err(e) = tx.upsert_live_state(&live).await {
            return Err(abort(tx, e).await);
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

async fn abort(tx: Box<dyn WriteTransaction>, err: TelemetryError) -> TelemetryError {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "rollback failed; transaction discarded on drop");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::{AppendPolicy, Fault, LiveStateReader, MemoryTelemetryStore};
    use telemetry_client::domain::DeviceClass;
    use time::macros::datetime;

    const NOW: time::OffsetDateTime = datetime!(2024-06-01 12:00:00 UTC);

    fn service(store: &MemoryTelemetryStore) -> IngestionService {
        IngestionService::with_clock(Arc::new(store.clone()), Arc::new(FixedClock(NOW)))
    }

    fn vehicle(id: &str, soc: f64, kwh: f64) -> VehicleReading {
        VehicleReading {
            vehicle_id: id.to_string(),
            soc,
            kwh_delivered_dc: kwh,
            battery_temp: 30.0,
            ts: NOW,
        }
    }

    fn meter(id: &str, kwh: f64) -> MeterReading {
        MeterReading {
            meter_id: id.to_string(),
            kwh_consumed_ac: kwh,
            voltage: 230.0,
            ts: NOW,
        }
    }

    #[tokio::test]
    async fn successful_ingest_writes_history_and_live_state() {
        let store = MemoryTelemetryStore::default();
        let svc = service(&store);

        let outcome = svc.submit_vehicle_reading(vehicle("V1", 80.0, 10.0)).await.unwrap();
        assert_eq!(outcome, AppendOutcome::Appended);

        assert_eq!(store.history_len(DeviceClass::Vehicle, "V1").await, 1);
        let live = store.vehicle_live_state("V1").await.unwrap().unwrap();
        assert_eq!(live.soc, 80.0);
        assert_eq!(live.battery_temp, 30.0);
        assert_eq!(live.last_kwh_delivered_dc, 10.0);
        assert_eq!(live.updated_at, NOW);
    }

    #[tokio::test]
    async fn meter_ingest_writes_both_sides() {
        let store = MemoryTelemetryStore::default();
        let svc = service(&store);

        svc.submit_meter_reading(meter("M1", 12.5)).await.unwrap();

        assert_eq!(store.history_len(DeviceClass::Meter, "M1").await, 1);
        let live = store.meter_live_state("M1").await.unwrap().unwrap();
        assert_eq!(live.last_kwh_consumed_ac, 12.5);
        assert_eq!(live.voltage, 230.0);
    }

    #[tokio::test]
    async fn repeated_readings_overwrite_live_state_and_append_history() {
        let store = MemoryTelemetryStore::default();
        let svc = service(&store);

        for (i, soc) in [20.0, 40.0, 60.0, 75.0].into_iter().enumerate() {
            svc.submit_vehicle_reading(vehicle("V1", soc, 1.0 + i as f64)).await.unwrap();
        }

        assert_eq!(store.history_len(DeviceClass::Vehicle, "V1").await, 4);
        assert_eq!(store.live_len(DeviceClass::Vehicle).await, 1);
        let live = store.vehicle_live_state("V1").await.unwrap().unwrap();
        assert_eq!(live.soc, 75.0);
        assert_eq!(live.last_kwh_delivered_dc, 4.0);
    }

    #[tokio::test]
    async fn identical_readings_each_append_by_default() {
        let store = MemoryTelemetryStore::default();
        let svc = service(&store);

        for _ in 0..3 {
            svc.submit_meter_reading(meter("M1", 1.0)).await.unwrap();
        }
        assert_eq!(store.history_len(DeviceClass::Meter, "M1").await, 3);
    }

    #[tokio::test]
    async fn retried_reading_is_not_duplicated_when_dedupe_enabled() {
        let store = MemoryTelemetryStore::new(AppendPolicy::SkipDuplicates);
        let svc = service(&store);

        let first = svc.submit_meter_reading(meter("M1", 1.0)).await.unwrap();
        let retry = svc.submit_meter_reading(meter("M1", 1.0)).await.unwrap();

        assert_eq!(first, AppendOutcome::Appended);
        assert_eq!(retry, AppendOutcome::Duplicate);
        assert_eq!(store.history_len(DeviceClass::Meter, "M1").await, 1);
        assert!(store.meter_live_state("M1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_retries_append_exactly_once_when_dedupe_enabled() {
        let store = MemoryTelemetryStore::new(AppendPolicy::SkipDuplicates);
        let svc = service(&store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.submit_meter_reading(meter("M1", 3.0)).await })
            })
            .collect();
        let mut appended = 0;
        for h in handles {
            if h.await.unwrap().unwrap() == AppendOutcome::Appended {
                appended += 1;
            }
        }

        assert_eq!(appended, 1);
        assert_eq!(store.history_len(DeviceClass::Meter, "M1").await, 1);
        assert_eq!(store.live_len(DeviceClass::Meter).await, 1);
    }

    #[tokio::test]
    async fn empty_identifier_is_rejected_without_writes() {
        let store = MemoryTelemetryStore::default();
        let svc = service(&store);

        let err = svc.submit_vehicle_reading(vehicle("", 50.0, 1.0)).await.unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidReading(_)));

        let err = svc.submit_meter_reading(meter("   ", 1.0)).await.unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidReading(_)));

        assert_eq!(store.live_len(DeviceClass::Vehicle).await, 0);
        assert_eq!(store.live_len(DeviceClass::Meter).await, 0);
    }

    #[tokio::test]
    async fn failure_at_any_step_leaves_no_partial_state() {
        for fault in [Fault::Begin, Fault::AppendHistory, Fault::UpsertLiveState, Fault::Commit] {
            let store = MemoryTelemetryStore::default();
            let svc = service(&store);
            store.inject_fault(Some(fault)).await;

            let err = svc.submit_vehicle_reading(vehicle("V1", 80.0, 10.0)).await.unwrap_err();
            assert!(
                matches!(err, TelemetryError::StorageUnavailable(_)),
                "{fault:?} produced {err:?}"
            );
            assert_eq!(store.history_len(DeviceClass::Vehicle, "V1").await, 0, "{fault:?}");
            assert!(store.vehicle_live_state("V1").await.unwrap().is_none(), "{fault:?}");
        }
    }

    #[tokio::test]
    async fn failed_overwrite_keeps_previous_live_state() {
        let store = MemoryTelemetryStore::default();
        let svc = service(&store);

        svc.submit_vehicle_reading(vehicle("V1", 40.0, 5.0)).await.unwrap();
        store.inject_fault(Some(Fault::UpsertLiveState)).await;
        assert!(svc.submit_vehicle_reading(vehicle("V1", 90.0, 9.0)).await.is_err());

        assert_eq!(store.history_len(DeviceClass::Vehicle, "V1").await, 1);
        let live = store.vehicle_live_state("V1").await.unwrap().unwrap();
        assert_eq!(live.soc, 40.0);
    }

    #[tokio::test]
    async fn exceeded_deadline_rolls_back() {
        let store = MemoryTelemetryStore::default();
        let svc = service(&store);
        store.inject_fault(Some(Fault::Stall(Duration::from_millis(200)))).await;

        let err = svc
            .ingest_within(meter("M1", 1.0).into(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::StorageUnavailable(ref m) if m.contains("deadline")));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(store.history_len(DeviceClass::Meter, "M1").await, 0);
        assert!(store.meter_live_state("M1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_readings_for_one_device_leave_one_live_row() {
        let store = MemoryTelemetryStore::default();
        let svc = service(&store);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.submit_meter_reading(meter("M1", 1.0 + i as f64)).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(store.history_len(DeviceClass::Meter, "M1").await, 16);
        assert_eq!(store.live_len(DeviceClass::Meter).await, 1);
    }
}
