use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;

use crate::domain::{MeterReading, VehicleReading};

/// Record `(event_id, ts)` in the event ledger. Returns `false` if it was
/// already there.
///
/// The ledger's primary key serializes concurrent claims: a second claim of
/// the same event blocks until the first transaction ends, then either
/// conflicts (first committed) or succeeds (first rolled back).
pub async fn claim_event(
    conn: &mut PgConnection,
    event_id: &str,
    ts: OffsetDateTime,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        r#"
        INSERT INTO telemetry_event_ids (event_id, ts)
        VALUES ($1, $2)
        ON CONFLICT (event_id, ts) DO NOTHING
        "#,
    )
    .bind(event_id)
    .bind(ts)
    .execute(conn)
    .await?;

    Ok(res.rows_affected() == 1)
}

/// Append a vehicle sample to the partitioned history table.
pub async fn insert_vehicle_reading(
    conn: &mut PgConnection,
    reading: &VehicleReading,
    event_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO vehicle_telemetry_history
            (event_id, vehicle_id, soc, kwh_delivered_dc, battery_temp, ts)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(event_id)
    .bind(&reading.vehicle_id)
    .bind(reading.soc)
    .bind(reading.kwh_delivered_dc)
    .bind(reading.battery_temp)
    .bind(reading.ts)
    .execute(conn)
    .await?;

    Ok(())
}

/// Append a meter sample to the partitioned history table.
pub async fn insert_meter_reading(
    conn: &mut PgConnection,
    reading: &MeterReading,
    event_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO meter_telemetry_history
            (event_id, meter_id, kwh_consumed_ac, voltage, ts)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(event_id)
    .bind(&reading.meter_id)
    .bind(reading.kwh_consumed_ac)
    .bind(reading.voltage)
    .bind(reading.ts)
    .execute(conn)
    .await?;

    Ok(())
}

/// All samples for one vehicle with `ts >= since`, oldest first.
///
/// Served by the `(vehicle_id, ts)` index.
pub async fn vehicle_readings_since(
    pool: &PgPool,
    vehicle_id: &str,
    since: OffsetDateTime,
) -> Result<Vec<VehicleReading>, sqlx::Error> {
    sqlx::query_as::<_, VehicleReading>(
        r#"
        SELECT
            vehicle_id,
            soc,
            kwh_delivered_dc,
            battery_temp,
            ts
        FROM vehicle_telemetry_history
        WHERE vehicle_id = $1
          AND ts >= $2
        ORDER BY ts
        "#,
    )
    .bind(vehicle_id)
    .bind(since)
    .fetch_all(pool)
    .await
}

/// All samples for the given meters with `ts >= since`, oldest first.
pub async fn meter_readings_since(
    pool: &PgPool,
    meter_ids: &[String],
    since: OffsetDateTime,
) -> Result<Vec<MeterReading>, sqlx::Error> {
    if meter_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, MeterReading>(
        r#"
        SELECT
            meter_id,
            kwh_consumed_ac,
            voltage,
            ts
        FROM meter_telemetry_history
        WHERE meter_id = ANY($1)
          AND ts >= $2
        ORDER BY ts
        "#,
    )
    .bind(meter_ids)
    .bind(since)
    .fetch_all(pool)
    .await
}
