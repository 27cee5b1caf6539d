use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, sea_query::Expr,
};
use uuid::Uuid;

use crate::db::entities::{prelude::*, shift};
use crate::db::enums::ShiftStatus;
use crate::db::store::NewShift;

pub async fn create_shift(db: &DatabaseConnection, new_shift: NewShift) -> Result<shift::Model, DbErr> {
    let now = Utc::now();
    let active_model = shift::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(new_shift.tenant_id),
        driver_id: Set(new_shift.driver_id),
        truck_id: Set(new_shift.truck_id),
        started_at: Set(new_shift.started_at),
        ended_at: Set(None),
        status: Set(ShiftStatus::Active),
        total_km: Set(0.0),
        created_at: Set(now),
        updated_at: Set(now),
    };
    active_model.insert(db).await
}

pub async fn get_active_shift_for_driver(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    driver_id: Uuid,
) -> Result<Option<shift::Model>, DbErr> {
    Shift::find()
        .filter(shift::Column::TenantId.eq(tenant_id))
        .filter(shift::Column::DriverId.eq(driver_id))
        .filter(shift::Column::Status.eq(ShiftStatus::Active))
        .order_by_desc(shift::Column::StartedAt)
        .one(db)
        .await
}

pub async fn is_truck_in_use(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    truck_id: Uuid,
) -> Result<bool, DbErr> {
    let count = Shift::find()
        .filter(shift::Column::TenantId.eq(tenant_id))
        .filter(shift::Column::TruckId.eq(truck_id))
        .filter(shift::Column::Status.eq(ShiftStatus::Active))
        .count(db)
        .await?;
    Ok(count > 0)
}

/// Conditional `active -> completed`. Zero matching rows yields `None`.
pub async fn complete_shift(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    driver_id: Uuid,
    shift_id: Uuid,
    total_km: f64,
    ended_at: DateTime<Utc>,
) -> Result<Option<shift::Model>, DbErr> {
    let mut updated = Shift::update_many()
        .col_expr(shift::Column::Status, Expr::value(ShiftStatus::Completed))
        .col_expr(shift::Column::EndedAt, Expr::value(ended_at))
        .col_expr(shift::Column::TotalKm, shift::Column::TotalKm.save_as(Expr::val(total_km)))
        .col_expr(shift::Column::UpdatedAt, Expr::value(ended_at))
        .filter(shift::Column::Id.eq(shift_id))
        .filter(shift::Column::TenantId.eq(tenant_id))
        .filter(shift::Column::DriverId.eq(driver_id))
        .filter(shift::Column::Status.eq(ShiftStatus::Active))
        .exec_with_returning(db)
        .await?;
    Ok(updated.pop())
}

pub async fn get_active_shifts(
    db: &DatabaseConnection,
    tenant_id: Option<Uuid>,
) -> Result<Vec<shift::Model>, DbErr> {
    let mut query = Shift::find().filter(shift::Column::Status.eq(ShiftStatus::Active));
    if let Some(tenant_id) = tenant_id {
        query = query.filter(shift::Column::TenantId.eq(tenant_id));
    }
    query.order_by_asc(shift::Column::StartedAt).all(db).await
}
