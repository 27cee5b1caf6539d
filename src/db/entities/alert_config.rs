use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_STOP_DURATION_MINUTES: i32 = 5;
pub const DEFAULT_OFFLINE_THRESHOLD_MINUTES: i32 = 3;

/// Per-tenant alerting policy. At most one row per tenant.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alert_config")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub tenant_id: Uuid,
    pub max_stop_duration_minutes: i32,
    pub alert_on_driver_offline: bool,
    pub offline_threshold_minutes: i32,
    pub notify_via_push: bool,
    pub notify_via_email: bool,
    pub notify_via_sms: bool,
    pub updated_at: ChronoDateTimeUtc,
}

impl Model {
    /// Policy applied to tenants that never saved one. The id is nil
    /// because no row backs it.
    pub fn defaults_for(tenant_id: Uuid) -> Self {
        Self {
            id: Uuid::nil(),
            tenant_id,
            max_stop_duration_minutes: DEFAULT_MAX_STOP_DURATION_MINUTES,
            alert_on_driver_offline: true,
            offline_threshold_minutes: DEFAULT_OFFLINE_THRESHOLD_MINUTES,
            notify_via_push: true,
            notify_via_email: true,
            notify_via_sms: false,
            updated_at: chrono::Utc::now(),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
