use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::db::entities::{gps_ping, prelude::*};
use crate::db::store::NewPing;

/// Writes the batch in one transaction.
pub async fn insert_pings(db: &DatabaseConnection, pings: Vec<NewPing>) -> Result<usize, DbErr> {
    if pings.is_empty() {
        return Ok(0);
    }
    let count = pings.len();
    let rows = pings.into_iter().map(|ping| gps_ping::ActiveModel {
        id: NotSet,
        tenant_id: Set(ping.tenant_id),
        driver_id: Set(ping.driver_id),
        truck_id: Set(ping.truck_id),
        shift_id: Set(ping.shift_id),
        latitude: Set(ping.latitude),
        longitude: Set(ping.longitude),
        speed_kmh: Set(ping.speed_kmh),
        heading: Set(ping.heading),
        accuracy: Set(ping.accuracy),
        battery_level: Set(ping.battery_level),
        is_moving: Set(ping.is_moving),
        recorded_at: Set(ping.recorded_at),
        received_at: Set(ping.received_at),
        is_delayed: Set(ping.is_delayed),
        created_at: Set(ping.received_at),
    });

    let txn = db.begin().await?;
    GpsPing::insert_many(rows).exec(&txn).await?;
    txn.commit().await?;
    Ok(count)
}

pub async fn get_pings_for_shift(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    shift_id: Uuid,
) -> Result<Vec<gps_ping::Model>, DbErr> {
    GpsPing::find()
        .filter(gps_ping::Column::TenantId.eq(tenant_id))
        .filter(gps_ping::Column::ShiftId.eq(shift_id))
        .order_by_asc(gps_ping::Column::RecordedAt)
        .order_by_asc(gps_ping::Column::Id)
        .all(db)
        .await
}

pub async fn get_latest_ping_for_shift(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    shift_id: Uuid,
) -> Result<Option<gps_ping::Model>, DbErr> {
    GpsPing::find()
        .filter(gps_ping::Column::TenantId.eq(tenant_id))
        .filter(gps_ping::Column::ShiftId.eq(shift_id))
        .order_by_desc(gps_ping::Column::RecordedAt)
        .order_by_desc(gps_ping::Column::Id)
        .one(db)
        .await
}

/// Latest ping per driver of a tenant since the given instant.
pub async fn get_latest_pings_for_tenant(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<gps_ping::Model>, DbErr> {
    GpsPing::find()
        .distinct_on([(GpsPing, gps_ping::Column::DriverId)])
        .filter(gps_ping::Column::TenantId.eq(tenant_id))
        .filter(gps_ping::Column::RecordedAt.gte(since))
        .order_by_asc(gps_ping::Column::DriverId)
        .order_by_desc(gps_ping::Column::RecordedAt)
        .order_by_desc(gps_ping::Column::Id)
        .all(db)
        .await
}
