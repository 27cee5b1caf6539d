use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{AlertStatus, AlertType};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub driver_id: Uuid,
    pub shift_id: Option<Uuid>,
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub status: AlertStatus,
    #[sea_orm(select_as = "float8", save_as = "numeric")]
    pub stop_latitude: Option<f64>,
    #[sea_orm(select_as = "float8", save_as = "numeric")]
    pub stop_longitude: Option<f64>,
    pub stop_duration_seconds: i32,
    pub nearest_zone_id: Option<Uuid>,
    #[sea_orm(select_as = "float8", save_as = "numeric")]
    pub nearest_zone_distance_meters: Option<f64>,
    pub manager_notes: Option<String>,
    pub triggered_at: ChronoDateTimeUtc,
    pub notified_at: Option<ChronoDateTimeUtc>,
    pub acknowledged_at: Option<ChronoDateTimeUtc>,
    pub resolved_at: Option<ChronoDateTimeUtc>,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shift::Entity",
        from = "Column::ShiftId",
        to = "super::shift::Column::Id",
        on_delete = "SetNull"
    )]
    Shift,
}

impl Related<super::shift::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shift.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
