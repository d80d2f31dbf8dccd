use sqlx::{postgres::PgPool, Postgres, Transaction};
use telemetry_client::db::{device_map_queries, history_queries, live_state_queries};
use telemetry_client::domain::{
    MeterLiveState, MeterReading, VehicleLiveState, VehicleMeterMap, VehicleReading,
};
use time::OffsetDateTime;

use super::{
    AppendOutcome, AppendPolicy, DeviceMappingStore, HistoryReader, LiveStateReader,
    TelemetryStore, WriteTransaction,
};
use crate::error::StoreResult;
use crate::model::{HistoryRow, LiveState, Reading};

/// PostgreSQL-backed store. History and live-state tables share one database,
/// so a single transaction covers the dual write.
#[derive(Clone)]
pub struct PgTelemetryStore {
    pool: PgPool,
    append_policy: AppendPolicy,
}

impl PgTelemetryStore {
    pub fn new(pool: PgPool, append_policy: AppendPolicy) -> Self {
        Self {
            pool,
            append_policy,
        }
    }
}

struct PgWriteTransaction {
    tx: Transaction<'static, Postgres>,
    append_policy: AppendPolicy,
}

#[async_trait::async_trait]
impl WriteTransaction for PgWriteTransaction {
    async fn append_history(&mut self, row: &HistoryRow) -> StoreResult<AppendOutcome> {
        if self.append_policy == AppendPolicy::SkipDuplicates
            && !history_queries::claim_event(&mut *self.tx, &row.event_id, row.reading.ts()).await?
        {
            return Ok(AppendOutcome::Duplicate);
        }

        match &row.reading {
            Reading::Vehicle(v) => {
                history_queries::insert_vehicle_reading(&mut *self.tx, v, &row.event_id).await?
            }
            Reading::Meter(m) => {
                history_queries::insert_meter_reading(&mut *self.tx, m, &row.event_id).await?
            }
        }
        Ok(AppendOutcome::Appended)
    }

    async fn upsert_live_state(&mut self, state: &LiveState) -> StoreResult<()> {
        match state {
            LiveState::Vehicle(v) => live_state_queries::upsert_vehicle_live_state(&mut *self.tx, v).await?,
            LiveState::Meter(m) => live_state_queries::upsert_meter_live_state(&mut *self.tx, m).await?,
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgWriteTransaction { tx, .. } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let PgWriteTransaction { tx, .. } = *self;
        tx.rollback().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TelemetryStore for PgTelemetryStore {
    async fn begin(&self) -> StoreResult<Box<dyn WriteTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgWriteTransaction {
            tx,
            append_policy: self.append_policy,
        }))
    }
}

#[async_trait::async_trait]
impl HistoryReader for PgTelemetryStore {
    async fn vehicle_history_since(
        &self,
        vehicle_id: &str,
        since: OffsetDateTime,
    ) -> StoreResult<Vec<VehicleReading>> {
        Ok(history_queries::vehicle_readings_since(&self.pool, vehicle_id, since).await?)
    }

    async fn meter_history_since(
        &self,
        meter_ids: &[String],
        since: OffsetDateTime,
    ) -> StoreResult<Vec<MeterReading>> {
        Ok(history_queries::meter_readings_since(&self.pool, meter_ids, since).await?)
    }
}

#[async_trait::async_trait]
impl DeviceMappingStore for PgTelemetryStore {
    async fn meters_for_vehicle(&self, vehicle_id: &str) -> StoreResult<Vec<VehicleMeterMap>> {
        Ok(device_map_queries::meters_for_vehicle(&self.pool, vehicle_id).await?)
    }
}

#[async_trait::async_trait]
impl LiveStateReader for PgTelemetryStore {
    async fn vehicle_live_state(&self, vehicle_id: &str) -> StoreResult<Option<VehicleLiveState>> {
        Ok(live_state_queries::vehicle_live_state(&self.pool, vehicle_id).await?)
    }

    async fn meter_live_state(&self, meter_id: &str) -> StoreResult<Option<MeterLiveState>> {
        Ok(live_state_queries::meter_live_state(&self.pool, meter_id).await?)
    }
}
