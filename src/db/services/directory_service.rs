use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::db::entities::{driver, prelude::*, vehicle};

pub async fn get_driver(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    driver_id: Uuid,
) -> Result<Option<driver::Model>, DbErr> {
    Driver::find_by_id(driver_id)
        .filter(driver::Column::TenantId.eq(tenant_id))
        .one(db)
        .await
}

pub async fn get_vehicle(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    vehicle_id: Uuid,
) -> Result<Option<vehicle::Model>, DbErr> {
    Vehicle::find_by_id(vehicle_id)
        .filter(vehicle::Column::TenantId.eq(tenant_id))
        .one(db)
        .await
}
