//! In-process store used by the test suites.
//!
//! A single mutex stands in for the database's concurrency control: staged
//! writes are applied under one lock acquisition at commit, so readers never
//! observe half of a dual write. With duplicate skipping on, writers also hold
//! a store-wide guard from `begin` to commit or rollback, the way a unique key
//! makes a second insert of the same event wait for the first transaction.

use std::{collections::HashMap, sync::Arc, time::Duration};

use telemetry_client::domain::{
    DeviceClass, MeterLiveState, MeterReading, VehicleLiveState, VehicleMeterMap, VehicleReading,
};
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    AppendOutcome, AppendPolicy, DeviceMappingStore, HistoryReader, LiveStateReader,
    TelemetryStore, WriteTransaction,
};
use crate::error::{StoreResult, TelemetryError};
use crate::model::{HistoryRow, LiveState, Reading};

/// A failure to inject into the next transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Begin,
    AppendHistory,
    UpsertLiveState,
    Commit,
    /// Sleep before staging the history row.
    Stall(Duration),
}

#[derive(Default)]
struct MemoryState {
    history: Vec<HistoryRow>,
    vehicle_live: HashMap<String, VehicleLiveState>,
    meter_live: HashMap<String, MeterLiveState>,
    mappings: Vec<VehicleMeterMap>,
    fault: Option<Fault>,
}

impl MemoryState {
    fn contains_event(&self, row: &HistoryRow) -> bool {
        self.history
            .iter()
            .any(|h| h.event_id == row.event_id && h.reading.ts() == row.reading.ts())
    }
}

#[derive(Clone, Default)]
pub struct MemoryTelemetryStore {
    inner: Arc<Mutex<MemoryState>>,
    writer: Arc<Mutex<()>>,
    append_policy: AppendPolicy,
}

impl MemoryTelemetryStore {
    pub fn new(append_policy: AppendPolicy) -> Self {
        Self {
            inner: Arc::default(),
            writer: Arc::default(),
            append_policy,
        }
    }

    /// Map a meter to a vehicle. Returns `false` if the pair already exists.
    pub async fn assign_meter(
        &self,
        vehicle_id: &str,
        meter_id: &str,
        assigned_at: OffsetDateTime,
    ) -> bool {
        let mut state = self.inner.lock().await;
        if state
            .mappings
            .iter()
            .any(|m| m.vehicle_id == vehicle_id && m.meter_id == meter_id)
        {
            return false;
        }
        state.mappings.push(VehicleMeterMap {
            vehicle_id: vehicle_id.to_string(),
            meter_id: meter_id.to_string(),
            assigned_at,
        });
        true
    }

    pub async fn inject_fault(&self, fault: Option<Fault>) {
        self.inner.lock().await.fault = fault;
    }

    /// Number of history rows stored for one device.
    pub async fn history_len(&self, class: DeviceClass, device_id: &str) -> usize {
        self.inner
            .lock()
            .await
            .history
            .iter()
            .filter(|h| h.reading.device_class() == class && h.reading.device_id() == device_id)
            .count()
    }

    /// Number of live-state rows across all devices of a class.
    pub async fn live_len(&self, class: DeviceClass) -> usize {
        let state = self.inner.lock().await;
        match class {
            DeviceClass::Vehicle => state.vehicle_live.len(),
            DeviceClass::Meter => state.meter_live.len(),
        }
    }
}

struct MemoryWriteTransaction {
    inner: Arc<Mutex<MemoryState>>,
    append_policy: AppendPolicy,
    fault: Option<Fault>,
    history: Vec<HistoryRow>,
    live: Vec<LiveState>,
    // released on commit, rollback or drop
    _writer: Option<OwnedMutexGuard<()>>,
}

impl MemoryWriteTransaction {
    fn check(&self, fault: Fault, op: &str) -> StoreResult<()> {
        if self.fault == Some(fault) {
            return Err(injected(op));
        }
        Ok(())
    }
}

fn injected(op: &str) -> TelemetryError {
    TelemetryError::StorageUnavailable(format!("injected fault during {op}"))
}

#[async_trait::async_trait]
impl WriteTransaction for MemoryWriteTransaction {
    async fn append_history(&mut self, row: &HistoryRow) -> StoreResult<AppendOutcome> {
        self.check(Fault::AppendHistory, "history append")?;
        if let Some(Fault::Stall(d)) = self.fault {
            tokio::time::sleep(d).await;
        }

        if self.append_policy == AppendPolicy::SkipDuplicates {
            let staged = self
                .history
                .iter()
                .any(|h| h.event_id == row.event_id && h.reading.ts() == row.reading.ts());
            if staged || self.inner.lock().await.contains_event(row) {
                return Ok(AppendOutcome::Duplicate);
            }
        }

        self.history.push(row.clone());
        Ok(AppendOutcome::Appended)
    }

    async fn upsert_live_state(&mut self, state: &LiveState) -> StoreResult<()> {
        self.check(Fault::UpsertLiveState, "live-state upsert")?;
        self.live.push(state.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.check(Fault::Commit, "commit")?;
        let MemoryWriteTransaction {
            inner,
            append_policy,
            history,
            live,
            ..
        } = *self;

        let mut state = inner.lock().await;
        if append_policy == AppendPolicy::SkipDuplicates {
            if let Some(row) = history.iter().find(|row| state.contains_event(row)) {
                return Err(TelemetryError::StorageUnavailable(format!(
                    "event {} was committed by a concurrent transaction",
                    row.event_id
                )));
            }
        }
        state.history.extend(history);
        for live in live {
            match live {
                LiveState::Vehicle(v) => {
                    state.vehicle_live.insert(v.vehicle_id.clone(), v);
                }
                LiveState::Meter(m) => {
                    state.meter_live.insert(m.meter_id.clone(), m);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn begin(&self) -> StoreResult<Box<dyn WriteTransaction>> {
        let fault = self.inner.lock().await.fault;
        if fault == Some(Fault::Begin) {
            return Err(injected("begin"));
        }
        let writer = match self.append_policy {
            AppendPolicy::SkipDuplicates => Some(self.writer.clone().lock_owned().await),
            AppendPolicy::Always => None,
        };
        Ok(Box::new(MemoryWriteTransaction {
            inner: self.inner.clone(),
            append_policy: self.append_policy,
            fault,
            history: Vec::new(),
            live: Vec::new(),
            _writer: writer,
        }))
    }
}

#[async_trait::async_trait]
impl HistoryReader for MemoryTelemetryStore {
    async fn vehicle_history_since(
        &self,
        vehicle_id: &str,
        since: OffsetDateTime,
    ) -> StoreResult<Vec<VehicleReading>> {
        let state = self.inner.lock().await;
        let mut rows: Vec<VehicleReading> = state
            .history
            .iter()
            .filter_map(|h| match &h.reading {
                Reading::Vehicle(v) if v.vehicle_id == vehicle_id && v.ts >= since => Some(v.clone()),
                _ => None,
            })
            .collect();
        rows.sort_by_key(|r| r.ts);
        Ok(rows)
    }

    async fn meter_history_since(
        &self,
        meter_ids: &[String],
        since: OffsetDateTime,
    ) -> StoreResult<Vec<MeterReading>> {
        let state = self.inner.lock().await;
        let mut rows: Vec<MeterReading> = state
            .history
            .iter()
            .filter_map(|h| match &h.reading {
                Reading::Meter(m) if m.ts >= since && meter_ids.contains(&m.meter_id) => Some(m.clone()),
                _ => None,
            })
            .collect();
        rows.sort_by_key(|r| r.ts);
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl DeviceMappingStore for MemoryTelemetryStore {
    async fn meters_for_vehicle(&self, vehicle_id: &str) -> StoreResult<Vec<VehicleMeterMap>> {
        let state = self.inner.lock().await;
        Ok(state
            .mappings
            .iter()
            .filter(|m| m.vehicle_id == vehicle_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl LiveStateReader for MemoryTelemetryStore {
    async fn vehicle_live_state(&self, vehicle_id: &str) -> StoreResult<Option<VehicleLiveState>> {
        Ok(self.inner.lock().await.vehicle_live.get(vehicle_id).cloned())
    }

    async fn meter_live_state(&self, meter_id: &str) -> StoreResult<Option<MeterLiveState>> {
        Ok(self.inner.lock().await.meter_live.get(meter_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn meter(id: &str, kwh: f64, ts: OffsetDateTime) -> MeterReading {
        MeterReading {
            meter_id: id.to_string(),
            kwh_consumed_ac: kwh,
            voltage: 230.0,
            ts,
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let store = MemoryTelemetryStore::default();
        let reading: Reading = meter("M1", 1.0, datetime!(2024-01-01 00:00:00 UTC)).into();

        let mut tx = store.begin().await.unwrap();
        tx.append_history(&HistoryRow::new(reading.clone())).await.unwrap();
        tx.upsert_live_state(&reading.live_state(datetime!(2024-01-01 00:00:00 UTC)))
            .await
            .unwrap();

        assert_eq!(store.history_len(DeviceClass::Meter, "M1").await, 0);
        assert!(store.meter_live_state("M1").await.unwrap().is_none());

        drop(tx);
        assert_eq!(store.history_len(DeviceClass::Meter, "M1").await, 0);
    }

    #[tokio::test]
    async fn skip_duplicates_reports_existing_event() {
        let store = MemoryTelemetryStore::new(AppendPolicy::SkipDuplicates);
        let row = HistoryRow::new(meter("M1", 1.0, datetime!(2024-01-01 00:00:00 UTC)).into());

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.append_history(&row).await.unwrap(), AppendOutcome::Appended);
        assert_eq!(tx.append_history(&row).await.unwrap(), AppendOutcome::Duplicate);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.append_history(&row).await.unwrap(), AppendOutcome::Duplicate);
        tx.commit().await.unwrap();

        assert_eq!(store.history_len(DeviceClass::Meter, "M1").await, 1);
    }

    #[tokio::test]
    async fn contending_dedupe_writer_sees_the_first_commit() {
        let store = MemoryTelemetryStore::new(AppendPolicy::SkipDuplicates);
        let row = HistoryRow::new(meter("M1", 1.0, datetime!(2024-01-01 00:00:00 UTC)).into());

        let mut first = store.begin().await.unwrap();
        assert_eq!(first.append_history(&row).await.unwrap(), AppendOutcome::Appended);

        let second = tokio::spawn({
            let store = store.clone();
            let row = row.clone();
            async move {
                let mut tx = store.begin().await.unwrap();
                let outcome = tx.append_history(&row).await.unwrap();
                tx.commit().await.unwrap();
                outcome
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        first.commit().await.unwrap();

        assert_eq!(second.await.unwrap(), AppendOutcome::Duplicate);
        assert_eq!(store.history_len(DeviceClass::Meter, "M1").await, 1);
    }

    #[tokio::test]
    async fn abandoned_dedupe_writer_releases_the_event() {
        let store = MemoryTelemetryStore::new(AppendPolicy::SkipDuplicates);
        let row = HistoryRow::new(meter("M1", 1.0, datetime!(2024-01-01 00:00:00 UTC)).into());

        let mut first = store.begin().await.unwrap();
        first.append_history(&row).await.unwrap();
        drop(first);

        let mut retry = store.begin().await.unwrap();
        assert_eq!(retry.append_history(&row).await.unwrap(), AppendOutcome::Appended);
        retry.commit().await.unwrap();
        assert_eq!(store.history_len(DeviceClass::Meter, "M1").await, 1);
    }

    #[tokio::test]
    async fn meter_window_filters_by_id_and_time() {
        let store = MemoryTelemetryStore::default();
        let mut tx = store.begin().await.unwrap();
        for r in [
            meter("M1", 1.0, datetime!(2024-01-01 12:00:00 UTC)),
            meter("M1", 2.0, datetime!(2024-01-01 06:00:00 UTC)),
            meter("M1", 4.0, datetime!(2023-12-31 00:00:00 UTC)),
            meter("M2", 8.0, datetime!(2024-01-01 12:00:00 UTC)),
        ] {
            tx.append_history(&HistoryRow::new(r.into())).await.unwrap();
        }
        tx.commit().await.unwrap();

        let rows = store
            .meter_history_since(&["M1".to_string()], datetime!(2024-01-01 00:00:00 UTC))
            .await
            .unwrap();
        let kwh: Vec<f64> = rows.iter().map(|r| r.kwh_consumed_ac).collect();
        assert_eq!(kwh, vec![2.0, 1.0]);
    }

    #[tokio::test]
    async fn mapping_pairs_are_unique() {
        let store = MemoryTelemetryStore::default();
        let at = datetime!(2024-01-01 00:00:00 UTC);
        assert!(store.assign_meter("V1", "M1", at).await);
        assert!(!store.assign_meter("V1", "M1", at).await);
        assert!(store.assign_meter("V1", "M2", at).await);
        assert_eq!(store.meters_for_vehicle("V1").await.unwrap().len(), 2);
    }
}
