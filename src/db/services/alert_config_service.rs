use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    sea_query::OnConflict,
};
use uuid::Uuid;

use crate::db::entities::{alert_config, prelude::*};
use crate::db::store::AlertConfigInput;

pub async fn get_alert_config(
    db: &DatabaseConnection,
    tenant_id: Uuid,
) -> Result<Option<alert_config::Model>, DbErr> {
    AlertConfig::find()
        .filter(alert_config::Column::TenantId.eq(tenant_id))
        .one(db)
        .await
}

/// Inserts or replaces the tenant's row, keyed on the unique `tenant_id`.
pub async fn upsert_alert_config(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    input: AlertConfigInput,
) -> Result<alert_config::Model, DbErr> {
    let row = alert_config::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        max_stop_duration_minutes: Set(input.max_stop_duration_minutes),
        alert_on_driver_offline: Set(input.alert_on_driver_offline),
        offline_threshold_minutes: Set(input.offline_threshold_minutes),
        notify_via_push: Set(input.notify_via_push),
        notify_via_email: Set(input.notify_via_email),
        notify_via_sms: Set(input.notify_via_sms),
        updated_at: Set(Utc::now()),
    };
    AlertConfig::insert(row)
        .on_conflict(
            OnConflict::column(alert_config::Column::TenantId)
                .update_columns([
                    alert_config::Column::MaxStopDurationMinutes,
                    alert_config::Column::AlertOnDriverOffline,
                    alert_config::Column::OfflineThresholdMinutes,
                    alert_config::Column::NotifyViaPush,
                    alert_config::Column::NotifyViaEmail,
                    alert_config::Column::NotifyViaSms,
                    alert_config::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_with_returning(db)
        .await
}
