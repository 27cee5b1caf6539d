//! SeaORM entities for the tracking tables, plus read-only views of the
//! `drivers` and `vehicles` tables that belong to other subsystems.

pub mod alert;
pub mod alert_config;
pub mod approved_zone;
pub mod driver;
pub mod gps_ping;
pub mod shift;
pub mod vehicle;

pub mod prelude {
    pub use super::alert::Entity as Alert;
    pub use super::alert::Model as AlertModel;
    pub use super::alert_config::Entity as AlertConfig;
    pub use super::alert_config::Model as AlertConfigModel;
    pub use super::approved_zone::Entity as ApprovedZone;
    pub use super::approved_zone::Model as ApprovedZoneModel;
    pub use super::driver::Entity as Driver;
    pub use super::gps_ping::Entity as GpsPing;
    pub use super::gps_ping::Model as GpsPingModel;
    pub use super::shift::Entity as Shift;
    pub use super::shift::Model as ShiftModel;
    pub use super::vehicle::Entity as Vehicle;
}
