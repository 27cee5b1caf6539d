use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "shift_status")]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "alert_type")]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    #[sea_orm(string_value = "unauthorized_stop")]
    UnauthorizedStop,
    #[sea_orm(string_value = "driver_offline")]
    DriverOffline,
    /// Stored and accepted on the wire, but nothing raises it yet.
    #[sea_orm(string_value = "speed_exceeded")]
    SpeedExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "alert_status")]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[sea_orm(string_value = "triggered")]
    Triggered,
    #[sea_orm(string_value = "notified")]
    Notified,
    #[sea_orm(string_value = "acknowledged")]
    Acknowledged,
    #[sea_orm(string_value = "resolved")]
    Resolved,
    #[sea_orm(string_value = "false_alarm")]
    FalseAlarm,
}

impl AlertStatus {
    /// Statuses a manager still has to act on.
    pub const OPEN: [AlertStatus; 3] = [
        AlertStatus::Triggered,
        AlertStatus::Notified,
        AlertStatus::Acknowledged,
    ];

    pub fn is_open(self) -> bool {
        Self::OPEN.contains(&self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "zone_type")]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    #[sea_orm(string_value = "warehouse")]
    Warehouse,
    #[sea_orm(string_value = "client_site")]
    ClientSite,
    #[sea_orm(string_value = "gas_station")]
    GasStation,
    #[sea_orm(string_value = "rest_area")]
    RestArea,
    #[default]
    #[sea_orm(string_value = "other")]
    Other,
}

macro_rules! display_as_db_value {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.to_value())
                }
            }
        )*
    };
}

display_as_db_value!(ShiftStatus, AlertType, AlertStatus, ZoneType);
