use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, sea_query::Expr,
};
use uuid::Uuid;

use crate::db::entities::{approved_zone, prelude::*};
use crate::db::store::ZoneInput;

pub async fn get_zones_for_tenant(
    db: &DatabaseConnection,
    tenant_id: Uuid,
) -> Result<Vec<approved_zone::Model>, DbErr> {
    ApprovedZone::find()
        .filter(approved_zone::Column::TenantId.eq(tenant_id))
        .order_by_asc(approved_zone::Column::CreatedAt)
        .all(db)
        .await
}

pub async fn create_zone(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    input: ZoneInput,
) -> Result<approved_zone::Model, DbErr> {
    let now = Utc::now();
    approved_zone::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        label: Set(input.label),
        latitude: Set(input.latitude),
        longitude: Set(input.longitude),
        radius_meters: Set(input.radius_meters),
        zone_type: Set(input.zone_type),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
}

pub async fn update_zone(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    zone_id: Uuid,
    input: ZoneInput,
) -> Result<Option<approved_zone::Model>, DbErr> {
    let mut updated = ApprovedZone::update_many()
        .col_expr(approved_zone::Column::Label, Expr::value(input.label))
        .col_expr(
            approved_zone::Column::Latitude,
            approved_zone::Column::Latitude.save_as(Expr::val(input.latitude)),
        )
        .col_expr(
            approved_zone::Column::Longitude,
            approved_zone::Column::Longitude.save_as(Expr::val(input.longitude)),
        )
        .col_expr(
            approved_zone::Column::RadiusMeters,
            approved_zone::Column::RadiusMeters.save_as(Expr::val(input.radius_meters)),
        )
        .col_expr(approved_zone::Column::ZoneType, Expr::value(input.zone_type))
        .col_expr(approved_zone::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(approved_zone::Column::Id.eq(zone_id))
        .filter(approved_zone::Column::TenantId.eq(tenant_id))
        .exec_with_returning(db)
        .await?;
    Ok(updated.pop())
}

pub async fn delete_zone(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    zone_id: Uuid,
) -> Result<bool, DbErr> {
    let result = ApprovedZone::delete_many()
        .filter(approved_zone::Column::Id.eq(zone_id))
        .filter(approved_zone::Column::TenantId.eq(tenant_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}
