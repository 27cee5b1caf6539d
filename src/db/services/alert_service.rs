use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, sea_query::Expr,
};
use uuid::Uuid;

use crate::db::entities::{alert, prelude::*};
use crate::db::enums::AlertStatus;
use crate::db::store::{AlertFilter, AlertPage, AlertTransition, NewAlert, RecentAlertQuery};

pub async fn create_alert(db: &DatabaseConnection, new_alert: NewAlert) -> Result<alert::Model, DbErr> {
    alert::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(new_alert.tenant_id),
        driver_id: Set(new_alert.driver_id),
        shift_id: Set(new_alert.shift_id),
        alert_type: Set(new_alert.alert_type),
        status: Set(AlertStatus::Triggered),
        stop_latitude: Set(new_alert.stop_latitude),
        stop_longitude: Set(new_alert.stop_longitude),
        stop_duration_seconds: Set(new_alert.stop_duration_seconds),
        nearest_zone_id: Set(new_alert.nearest_zone_id),
        nearest_zone_distance_meters: Set(new_alert.nearest_zone_distance_meters),
        manager_notes: Set(None),
        triggered_at: Set(new_alert.triggered_at),
        notified_at: Set(Some(new_alert.triggered_at)),
        acknowledged_at: Set(None),
        resolved_at: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
}

pub async fn get_alert(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    alert_id: Uuid,
) -> Result<Option<alert::Model>, DbErr> {
    Alert::find_by_id(alert_id)
        .filter(alert::Column::TenantId.eq(tenant_id))
        .one(db)
        .await
}

pub async fn list_alerts(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    filter: AlertFilter,
) -> Result<AlertPage, DbErr> {
    let mut query = Alert::find().filter(alert::Column::TenantId.eq(tenant_id));
    if let Some(status) = filter.status {
        query = query.filter(alert::Column::Status.eq(status));
    }
    let total = query.clone().count(db).await?;
    let alerts = query
        .order_by_desc(alert::Column::TriggeredAt)
        .offset(filter.offset)
        .limit(filter.limit)
        .all(db)
        .await?;
    Ok(AlertPage { alerts, total })
}

/// Applies a manager transition only when the current status allows it.
pub async fn transition_alert(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    alert_id: Uuid,
    transition: AlertTransition,
    at: DateTime<Utc>,
) -> Result<Option<alert::Model>, DbErr> {
    let mut update = Alert::update_many()
        .col_expr(alert::Column::Status, Expr::value(transition.target_status()))
        .filter(alert::Column::Id.eq(alert_id))
        .filter(alert::Column::TenantId.eq(tenant_id))
        .filter(alert::Column::Status.is_in(transition.allowed_from().iter().copied()));
    update = match transition {
        AlertTransition::Acknowledge => update.col_expr(alert::Column::AcknowledgedAt, Expr::value(at)),
        AlertTransition::Resolve { notes } => {
            let update = update.col_expr(alert::Column::ResolvedAt, Expr::value(at));
            match notes {
                Some(notes) => update.col_expr(alert::Column::ManagerNotes, Expr::value(notes)),
                None => update,
            }
        }
        AlertTransition::FalseAlarm => update.col_expr(alert::Column::ResolvedAt, Expr::value(at)),
    };
    let mut updated = update.exec_with_returning(db).await?;
    Ok(updated.pop())
}

pub async fn has_recent_alert(db: &DatabaseConnection, query: RecentAlertQuery) -> Result<bool, DbErr> {
    let mut select = Alert::find()
        .filter(alert::Column::TenantId.eq(query.tenant_id))
        .filter(alert::Column::DriverId.eq(query.driver_id))
        .filter(alert::Column::TriggeredAt.gte(query.since));
    if let Some(alert_type) = query.alert_type {
        select = select.filter(alert::Column::AlertType.eq(alert_type));
    }
    if query.open_only {
        select = select.filter(alert::Column::Status.is_in(AlertStatus::OPEN));
    }
    Ok(select.count(db).await? > 0)
}
