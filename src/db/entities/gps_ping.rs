use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One stored position sample. Rows are append-only.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "gps_pings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: Uuid,
    pub driver_id: Uuid,
    pub truck_id: Uuid,
    pub shift_id: Uuid,
    #[sea_orm(select_as = "float8", save_as = "numeric")]
    pub latitude: f64,
    #[sea_orm(select_as = "float8", save_as = "numeric")]
    pub longitude: f64,
    #[sea_orm(select_as = "float8", save_as = "numeric")]
    pub speed_kmh: f64,
    #[sea_orm(select_as = "integer", save_as = "smallint")]
    pub heading: i32,
    #[sea_orm(select_as = "float8", save_as = "numeric")]
    pub accuracy: f64,
    #[sea_orm(select_as = "integer", save_as = "smallint")]
    pub battery_level: i32,
    pub is_moving: bool,
    /// Device clock.
    pub recorded_at: ChronoDateTimeUtc,
    /// Server clock.
    pub received_at: ChronoDateTimeUtc,
    pub is_delayed: bool,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::shift::Entity",
        from = "Column::ShiftId",
        to = "super::shift::Column::Id",
        on_delete = "Cascade"
    )]
    Shift,
}

impl Related<super::shift::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shift.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
