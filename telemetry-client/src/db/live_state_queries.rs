use sqlx::{PgConnection, PgPool};

use crate::domain::{MeterLiveState, VehicleLiveState};

/// Insert-or-replace the live row for a vehicle.
///
/// Relies on the primary key on `vehicle_id`; concurrent upserts for the same
/// vehicle serialize on that key and the last commit wins.
pub async fn upsert_vehicle_live_state(
    conn: &mut PgConnection,
    state: &VehicleLiveState,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO vehicle_live_state
            (vehicle_id, soc, battery_temp, last_kwh_delivered_dc, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (vehicle_id) DO UPDATE SET
            soc                   = EXCLUDED.soc,
            battery_temp          = EXCLUDED.battery_temp,
            last_kwh_delivered_dc = EXCLUDED.last_kwh_delivered_dc,
            updated_at            = EXCLUDED.updated_at
        "#,
    )
    .bind(&state.vehicle_id)
    .bind(state.soc)
    .bind(state.battery_temp)
    .bind(state.last_kwh_delivered_dc)
    .bind(state.updated_at)
    .execute(conn)
    .await
    .map(|_| ())
}

pub async fn upsert_meter_live_state(
    conn: &mut PgConnection,
    state: &MeterLiveState,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO meter_live_state
            (meter_id, last_kwh_consumed_ac, voltage, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (meter_id) DO UPDATE SET
            last_kwh_consumed_ac = EXCLUDED.last_kwh_consumed_ac,
            voltage              = EXCLUDED.voltage,
            updated_at           = EXCLUDED.updated_at
        "#,
    )
    .bind(&state.meter_id)
    .bind(state.last_kwh_consumed_ac)
    .bind(state.voltage)
    .bind(state.updated_at)
    .execute(conn)
    .await
    .map(|_| ())
}

pub async fn vehicle_live_state(
    pool: &PgPool,
    vehicle_id: &str,
) -> Result<Option<VehicleLiveState>, sqlx::Error> {
    sqlx::query_as::<_, VehicleLiveState>(
        r#"
        SELECT vehicle_id, soc, battery_temp, last_kwh_delivered_dc, updated_at
        FROM vehicle_live_state
        WHERE vehicle_id = $1
        "#,
    )
    .bind(vehicle_id)
    .fetch_optional(pool)
    .await
}

pub async fn meter_live_state(
    pool: &PgPool,
    meter_id: &str,
) -> Result<Option<MeterLiveState>, sqlx::Error> {
    sqlx::query_as::<_, MeterLiveState>(
        r#"
        SELECT meter_id, last_kwh_consumed_ac, voltage, updated_at
        FROM meter_live_state
        WHERE meter_id = $1
        "#,
    )
    .bind(meter_id)
    .fetch_optional(pool)
    .await
}
