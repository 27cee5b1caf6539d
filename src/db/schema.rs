//! Startup checks for the constraints the tracking core relies on.
//!
//! Tables are created by the platform's migrations. Coordinates, speed,
//! accuracy, distances and `shifts.total_km` are `DECIMAL`, heading and
//! battery `SMALLINT`, `approved_zones.radius_meters` `INT`, and enum
//! columns `VARCHAR`. The entities cast these to `float8` and `integer` on
//! read and back on write.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
use tracing::info;

use crate::db::store::{ACTIVE_DRIVER_CONSTRAINT, ACTIVE_TRUCK_CONSTRAINT};

fn active_shift_index_sql(name: &str, column: &str) -> String {
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {name} ON shifts (tenant_id, {column}) WHERE status = 'active'"
    )
}

/// Creates the partial unique indexes that back "one active shift per
/// driver" and "one active shift per truck". Idempotent.
pub async fn ensure_tracking_constraints(db: &DatabaseConnection) -> Result<(), DbErr> {
    for (name, column) in [
        (ACTIVE_DRIVER_CONSTRAINT, "driver_id"),
        (ACTIVE_TRUCK_CONSTRAINT, "truck_id"),
    ] {
        db.execute_unprepared(&active_shift_index_sql(name, column)).await?;
        info!(index = name, "Ensured active shift index.");
    }
    Ok(())
}
