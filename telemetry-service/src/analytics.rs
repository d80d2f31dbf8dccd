use std::{collections::BTreeSet, sync::Arc};

use serde::{Deserialize, Serialize};
use telemetry_client::domain::{MeterReading, VehicleMeterMap, VehicleReading};
use time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::{NotFound, TelemetryError};
use crate::store::{DeviceMappingStore, HistoryReader};

pub const DEFAULT_WINDOW: Duration = Duration::hours(24);

/// Upper bound on any configured or requested window: 100 years of hours.
pub const MAX_WINDOW_HOURS: i64 = 100 * 8_766;

/// Which mapped meters feed the AC side of a vehicle's report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingPolicy {
    /// Only the most recently assigned meter.
    #[default]
    Latest,
    /// Every distinct mapped meter, each counted once.
    All,
}

/// Charging efficiency of one vehicle over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub vehicle_id: String,
    pub total_energy_consumed_ac: f64,
    pub total_energy_delivered_dc: f64,
    pub efficiency_ratio: f64,
    pub average_battery_temp: f64,
    pub window_hours: i64,
    pub meter_ids: Vec<String>,
}

/// Raw sums over one window. `None` means no rows contributed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowTotals {
    pub dc_total: Option<f64>,
    pub ac_total: Option<f64>,
    pub avg_battery_temp: Option<f64>,
}

/// Energies are additive and summed; temperature is intensive and averaged.
pub fn aggregate(vehicle: &[VehicleReading], meter: &[MeterReading]) -> WindowTotals {
    let dc_total = (!vehicle.is_empty()).then(|| vehicle.iter().map(|v| v.kwh_delivered_dc).sum());
    let ac_total = (!meter.is_empty()).then(|| meter.iter().map(|m| m.kwh_consumed_ac).sum());
    let avg_battery_temp = (!vehicle.is_empty())
        .then(|| vehicle.iter().map(|v| v.battery_temp).sum::<f64>() / vehicle.len() as f64);

    WindowTotals {
        dc_total,
        ac_total,
        avg_battery_temp,
    }
}

/// DC delivered per unit of AC consumed; zero when nothing was consumed.
pub fn efficiency_ratio(dc_total: f64, ac_total: f64) -> f64 {
    if ac_total > 0.0 {
        finite_or_zero(Some(dc_total / ac_total))
    } else {
        0.0
    }
}

fn finite_or_zero(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

/// Meter ids whose readings count towards the vehicle's AC total.
pub fn select_meters(assignments: &[VehicleMeterMap], policy: MappingPolicy) -> Vec<String> {
    match policy {
        MappingPolicy::Latest => assignments
            .iter()
            // ties on assigned_at go to the lexically smallest meter id
            .max_by(|a, b| {
                a.assigned_at
                    .cmp(&b.assigned_at)
                    .then_with(|| b.meter_id.cmp(&a.meter_id))
            })
            .map(|m| vec![m.meter_id.clone()])
            .unwrap_or_default(),
        MappingPolicy::All => assignments
            .iter()
            .map(|m| m.meter_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    }
}

#[derive(Clone)]
pub struct AnalyticsService {
    history: Arc<dyn HistoryReader>,
    mappings: Arc<dyn DeviceMappingStore>,
    clock: Arc<dyn Clock>,
    policy: MappingPolicy,
    default_window: Duration,
}

impl AnalyticsService {
    pub fn new(history: Arc<dyn HistoryReader>, mappings: Arc<dyn DeviceMappingStore>) -> Self {
        Self {
            history,
            mappings,
            clock: Arc::new(SystemClock),
            policy: MappingPolicy::default(),
            default_window: DEFAULT_WINDOW,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: MappingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_window(mut self, window: Duration) -> Self {
        self.default_window = window;
        self
    }

    pub fn default_window(&self) -> Duration {
        self.default_window
    }

    pub async fn get_performance(&self, vehicle_id: &str) -> Result<PerformanceReport, TelemetryError> {
        self.performance(vehicle_id, self.default_window).await
    }

    /// Join the vehicle's history with its meter's history over `window`.
    ///
    /// Fails with `NotFound` when the vehicle has no readings in the window,
    /// regardless of meter activity.
    pub async fn performance(
        &self,
        vehicle_id: &str,
        window: Duration,
    ) -> Result<PerformanceReport, TelemetryError> {
        metrics::counter!("analytics_performance_requests_total").increment(1);

        let since = self.clock.now().checked_sub(window).ok_or_else(|| {
            TelemetryError::InvalidWindow(format!(
                "a window of {} hours reaches before the earliest supported timestamp",
                window.whole_hours()
            ))
        })?;

        let assignments = self.mappings.meters_for_vehicle(vehicle_id).await?;
        let meter_ids = select_meters(&assignments, self.policy);
        if assignments.len() > 1 {
            tracing::debug!(
                vehicle_id,
                mapped = assignments.len(),
                policy = ?self.policy,
                selected = ?meter_ids,
                "vehicle has multiple meter assignments"
            );
        }

        let (vehicle_rows, meter_rows) = futures::try_join!(
            self.history.vehicle_history_since(vehicle_id, since),
            self.history.meter_history_since(&meter_ids, since),
        )?;

        let totals = aggregate(&vehicle_rows, &meter_rows);

        let dc_total = match totals.dc_total {
            Some(dc) if dc > 0.0 => dc,
            _ => {
                metrics::counter!("analytics_not_found_total").increment(1);
                return Err(TelemetryError::NotFound(NotFound::VehicleActivity {
                    vehicle_id: vehicle_id.to_string(),
                    window,
                }));
            }
        };
        let ac_total = finite_or_zero(totals.ac_total);

        Ok(PerformanceReport {
            vehicle_id: vehicle_id.to_string(),
            total_energy_consumed_ac: ac_total,
            total_energy_delivered_dc: finite_or_zero(Some(dc_total)),
            efficiency_ratio: efficiency_ratio(dc_total, ac_total),
            average_battery_temp: finite_or_zero(totals.avg_battery_temp),
            window_hours: window.whole_hours(),
            meter_ids,
        })
    }
}
