use sqlx::PgPool;

use crate::domain::VehicleMeterMap;

/// Every meter ever assigned to `vehicle_id`, most recent assignment first.
pub async fn meters_for_vehicle(
    pool: &PgPool,
    vehicle_id: &str,
) -> Result<Vec<VehicleMeterMap>, sqlx::Error> {
    sqlx::query_as::<_, VehicleMeterMap>(
        r#"
        SELECT vehicle_id, meter_id, assigned_at
        FROM vehicle_meter_map
        WHERE vehicle_id = $1
        ORDER BY assigned_at DESC, meter_id
        "#,
    )
    .bind(vehicle_id)
    .fetch_all(pool)
    .await
}
