use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::ShiftStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shifts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub driver_id: Uuid,
    pub truck_id: Uuid,
    pub started_at: ChronoDateTimeUtc,
    pub ended_at: Option<ChronoDateTimeUtc>,
    pub status: ShiftStatus,
    /// `DECIMAL(8,2)` in the table.
    #[sea_orm(select_as = "float8", save_as = "numeric")]
    pub total_km: f64,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::gps_ping::Entity")]
    GpsPing,
    #[sea_orm(has_many = "super::alert::Entity")]
    Alert,
}

impl Related<super::gps_ping::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GpsPing.def()
    }
}

impl Related<super::alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Alert.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
