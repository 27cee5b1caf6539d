use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::ZoneType;

/// Circular area where a stopped vehicle does not raise an alert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "approved_zones")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub label: String,
    #[sea_orm(select_as = "float8", save_as = "numeric")]
    pub latitude: f64,
    #[sea_orm(select_as = "float8", save_as = "numeric")]
    pub longitude: f64,
    /// Whole meters in the table.
    #[sea_orm(select_as = "float8", save_as = "integer")]
    pub radius_meters: f64,
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
