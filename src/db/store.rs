//! Storage seams consumed by the tracking core. `PgStore` implements them
//! over PostgreSQL, `MemoryStore` in-process for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DbErr, RuntimeErr};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::entities::{alert, alert_config, approved_zone, driver, gps_ping, shift, vehicle};
use crate::db::enums::{AlertStatus, AlertType, ZoneType};

pub const ACTIVE_DRIVER_CONSTRAINT: &str = "uq_shifts_active_driver";
pub const ACTIVE_TRUCK_CONSTRAINT: &str = "uq_shifts_active_truck";

#[derive(Debug, Error)]
pub enum StoreError {
    /// Carries the violated constraint name when the backend reports one.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        if let DbErr::Query(RuntimeErr::SqlxError(sqlx_error))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_error)) = &err
        {
            if let sqlx::Error::Database(database_error) = sqlx_error {
                if database_error.is_unique_violation() {
                    return StoreError::UniqueViolation(
                        database_error.constraint().unwrap_or_default().to_string(),
                    );
                }
            }
        }
        StoreError::Database(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewShift {
    pub tenant_id: Uuid,
    pub driver_id: Uuid,
    pub truck_id: Uuid,
    pub started_at: DateTime<Utc>,
}

/// A validated ping ready to be written. Truck and shift ids always come
/// from the driver's active shift.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPing {
    pub tenant_id: Uuid,
    pub driver_id: Uuid,
    pub truck_id: Uuid,
    pub shift_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
    pub heading: i32,
    pub accuracy: f64,
    pub battery_level: i32,
    pub is_moving: bool,
    pub recorded_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub is_delayed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneInput {
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    #[serde(rename = "type", default)]
    pub zone_type: ZoneType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfigInput {
    pub max_stop_duration_minutes: i32,
    pub alert_on_driver_offline: bool,
    pub offline_threshold_minutes: i32,
    pub notify_via_push: bool,
    pub notify_via_email: bool,
    pub notify_via_sms: bool,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub tenant_id: Uuid,
    pub driver_id: Uuid,
    pub shift_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub stop_latitude: Option<f64>,
    pub stop_longitude: Option<f64>,
    pub stop_duration_seconds: i32,
    pub nearest_zone_id: Option<Uuid>,
    pub nearest_zone_distance_meters: Option<f64>,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub struct AlertPage {
    pub alerts: Vec<alert::Model>,
    pub total: u64,
}

/// Manager actions on an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertTransition {
    Acknowledge,
    Resolve { notes: Option<String> },
    FalseAlarm,
}

impl AlertTransition {
    pub fn target_status(&self) -> AlertStatus {
        match self {
            AlertTransition::Acknowledge => AlertStatus::Acknowledged,
            AlertTransition::Resolve { .. } => AlertStatus::Resolved,
            AlertTransition::FalseAlarm => AlertStatus::FalseAlarm,
        }
    }

    /// Source statuses the transition may start from.
    pub fn allowed_from(&self) -> &'static [AlertStatus] {
        match self {
            AlertTransition::Acknowledge => &[AlertStatus::Triggered, AlertStatus::Notified],
            AlertTransition::Resolve { .. } | AlertTransition::FalseAlarm => &AlertStatus::OPEN,
        }
    }

    /// Applies the transition to an in-memory row.
    pub fn apply(&self, alert: &mut alert::Model, at: DateTime<Utc>) {
        alert.status = self.target_status();
        match self {
            AlertTransition::Acknowledge => alert.acknowledged_at = Some(at),
            AlertTransition::Resolve { notes } => {
                alert.resolved_at = Some(at);
                if notes.is_some() {
                    alert.manager_notes = notes.clone();
                }
            }
            AlertTransition::FalseAlarm => alert.resolved_at = Some(at),
        }
    }
}

/// Query for recent alerts of a driver.
#[derive(Debug, Clone, Copy)]
pub struct RecentAlertQuery {
    pub tenant_id: Uuid,
    pub driver_id: Uuid,
    /// `None` matches every type.
    pub alert_type: Option<AlertType>,
    pub since: DateTime<Utc>,
    pub open_only: bool,
}

impl RecentAlertQuery {
    pub fn matches(&self, alert: &alert::Model) -> bool {
        alert.tenant_id == self.tenant_id
            && alert.driver_id == self.driver_id
            && self.alert_type.is_none_or(|t| t == alert.alert_type)
            && alert.triggered_at >= self.since
            && (!self.open_only || alert.status.is_open())
    }
}

#[async_trait]
pub trait ShiftStore: Send + Sync {
    /// Inserts an `active` shift. Fails with `UniqueViolation` when the
    /// driver or truck already has one.
    async fn insert_shift(&self, new_shift: NewShift) -> Result<shift::Model, StoreError>;
    async fn find_active_shift_for_driver(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
    ) -> Result<Option<shift::Model>, StoreError>;
    async fn is_truck_in_use(&self, tenant_id: Uuid, truck_id: Uuid) -> Result<bool, StoreError>;
    /// Moves the matching `active` shift to `completed`. `None` when no
    /// active shift matches tenant, driver and id.
    async fn complete_shift(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
        shift_id: Uuid,
        total_km: f64,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<shift::Model>, StoreError>;
    /// Active shifts of every tenant.
    async fn find_all_active_shifts(&self) -> Result<Vec<shift::Model>, StoreError>;
    async fn find_active_shifts_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<shift::Model>, StoreError>;
}

#[async_trait]
pub trait PingStore: Send + Sync {
    /// Writes the whole batch or nothing. Returns the number of rows stored.
    async fn insert_pings(&self, pings: Vec<NewPing>) -> Result<usize, StoreError>;
    /// Pings of a shift ordered by `recorded_at` ascending.
    async fn find_pings_for_shift(
        &self,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Vec<gps_ping::Model>, StoreError>;
    /// Latest ping recorded under this shift. Pings of earlier shifts of
    /// the same driver never count.
    async fn find_latest_ping_for_shift(
        &self,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Option<gps_ping::Model>, StoreError>;
    /// Latest ping per driver recorded at or after `since`.
    async fn find_latest_pings_for_tenant(
        &self,
        tenant_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<gps_ping::Model>, StoreError>;
}

#[async_trait]
pub trait ZoneStore: Send + Sync {
    async fn find_zones_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<approved_zone::Model>, StoreError>;
    async fn insert_zone(
        &self,
        tenant_id: Uuid,
        input: ZoneInput,
    ) -> Result<approved_zone::Model, StoreError>;
    async fn update_zone(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        input: ZoneInput,
    ) -> Result<Option<approved_zone::Model>, StoreError>;
    async fn delete_zone(&self, tenant_id: Uuid, zone_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait AlertConfigStore: Send + Sync {
    async fn find_alert_config(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<alert_config::Model>, StoreError>;
    async fn upsert_alert_config(
        &self,
        tenant_id: Uuid,
        input: AlertConfigInput,
    ) -> Result<alert_config::Model, StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Persists a new alert in `triggered` with `notified_at = triggered_at`.
    async fn insert_alert(&self, new_alert: NewAlert) -> Result<alert::Model, StoreError>;
    async fn find_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
    ) -> Result<Option<alert::Model>, StoreError>;
    /// Newest first.
    async fn list_alerts(
        &self,
        tenant_id: Uuid,
        filter: AlertFilter,
    ) -> Result<AlertPage, StoreError>;
    /// `None` when the alert does not exist or its status does not allow
    /// the transition.
    async fn transition_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
        transition: AlertTransition,
        at: DateTime<Utc>,
    ) -> Result<Option<alert::Model>, StoreError>;
    async fn has_recent_alert(&self, query: RecentAlertQuery) -> Result<bool, StoreError>;
}

/// Everything the tracking core needs from durable storage.
pub trait TrackingStore:
    ShiftStore + PingStore + ZoneStore + AlertConfigStore + AlertStore
{
}

impl<T> TrackingStore for T where
    T: ShiftStore + PingStore + ZoneStore + AlertConfigStore + AlertStore
{
}

/// Driver and vehicle records owned by other subsystems.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_driver(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
    ) -> Result<Option<driver::Model>, StoreError>;
    async fn find_vehicle(
        &self,
        tenant_id: Uuid,
        vehicle_id: Uuid,
    ) -> Result<Option<vehicle::Model>, StoreError>;
}
