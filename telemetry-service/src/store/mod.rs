//! Contracts for the stores the services write to and read from.
//!
//! The services never hold a connection themselves: a store handle is built
//! once at startup and injected behind these traits.

pub mod memory;
pub mod postgres;

pub use memory::{Fault, MemoryTelemetryStore};
pub use postgres::PgTelemetryStore;

use telemetry_client::domain::{
    MeterLiveState, MeterReading, VehicleLiveState, VehicleMeterMap, VehicleReading,
};
use time::OffsetDateTime;

use crate::error::StoreResult;
use crate::model::{HistoryRow, LiveState};

/// How a history append treats a row whose event id is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppendPolicy {
    #[default]
    Always,
    SkipDuplicates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Only returned under [`AppendPolicy::SkipDuplicates`].
    Duplicate,
}

/// One atomic unit of work spanning history and live state.
///
/// Nothing written through a transaction is visible until `commit` succeeds.
/// Dropping a transaction without committing discards its writes.
#[async_trait::async_trait]
pub trait WriteTransaction: Send {
    async fn append_history(&mut self, row: &HistoryRow) -> StoreResult<AppendOutcome>;

    /// Insert-or-replace keyed by device id.
    async fn upsert_live_state(&mut self, state: &LiveState) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait::async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn WriteTransaction>>;
}

/// Windowed reads over the append-only history.
#[async_trait::async_trait]
pub trait HistoryReader: Send + Sync {
    async fn vehicle_history_since(
        &self,
        vehicle_id: &str,
        since: OffsetDateTime,
    ) -> StoreResult<Vec<VehicleReading>>;

    async fn meter_history_since(
        &self,
        meter_ids: &[String],
        since: OffsetDateTime,
    ) -> StoreResult<Vec<MeterReading>>;
}

#[async_trait::async_trait]
pub trait DeviceMappingStore: Send + Sync {
    /// Every meter mapped to the vehicle, in any order.
    async fn meters_for_vehicle(&self, vehicle_id: &str) -> StoreResult<Vec<VehicleMeterMap>>;
}

#[async_trait::async_trait]
pub trait LiveStateReader: Send + Sync {
    async fn vehicle_live_state(&self, vehicle_id: &str) -> StoreResult<Option<VehicleLiveState>>;

    async fn meter_live_state(&self, meter_id: &str) -> StoreResult<Option<MeterLiveState>>;
}
