//! In-process implementation of every storage seam. Used by the test
//! suites and handy for running the router without PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::entities::{alert, alert_config, approved_zone, driver, gps_ping, shift, vehicle};
use crate::db::enums::{AlertStatus, AlertType, ShiftStatus};
use crate::db::store::{
    ACTIVE_DRIVER_CONSTRAINT, ACTIVE_TRUCK_CONSTRAINT, AlertConfigInput, AlertConfigStore,
    AlertFilter, AlertPage, AlertStore, AlertTransition, Directory, NewAlert, NewPing, NewShift,
    PingStore, RecentAlertQuery, ShiftStore, StoreError, ZoneInput, ZoneStore,
};

#[derive(Default)]
struct Tables {
    shifts: Vec<shift::Model>,
    pings: Vec<gps_ping::Model>,
    next_ping_id: i64,
    zones: Vec<approved_zone::Model>,
    alert_configs: HashMap<Uuid, alert_config::Model>,
    alerts: Vec<alert::Model>,
    drivers: HashMap<Uuid, driver::Model>,
    vehicles: HashMap<Uuid, vehicle::Model>,
    fail_ping_writes: bool,
    fail_alert_writes: Vec<AlertType>,
}

/// Emulates the partial unique indexes on active shifts and the
/// all-or-nothing ping batch write.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_driver(&self, tenant_id: Uuid, first_name: &str, last_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let row = driver::Model {
            id,
            tenant_id,
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
        };
        self.tables.lock().await.drivers.insert(id, row);
        id
    }

    pub async fn add_vehicle(&self, tenant_id: Uuid, license_plate: &str) -> Uuid {
        let id = Uuid::new_v4();
        let row = vehicle::Model {
            id,
            tenant_id,
            name: None,
            license_plate: Some(license_plate.to_string()),
        };
        self.tables.lock().await.vehicles.insert(id, row);
        id
    }

    /// Makes every following ping write fail, to exercise the batch
    /// atomicity path.
    pub async fn fail_ping_writes(&self, fail: bool) {
        self.tables.lock().await.fail_ping_writes = fail;
    }

    /// Makes every following alert insert of `alert_type` fail.
    pub async fn fail_alert_writes(&self, alert_type: AlertType) {
        self.tables.lock().await.fail_alert_writes.push(alert_type);
    }

    pub async fn all_pings(&self) -> Vec<gps_ping::Model> {
        self.tables.lock().await.pings.clone()
    }

    pub async fn all_alerts(&self) -> Vec<alert::Model> {
        self.tables.lock().await.alerts.clone()
    }

    /// Inserts an already-built ping row as is, bypassing ingestion.
    pub async fn insert_raw_ping(&self, mut ping: gps_ping::Model) -> gps_ping::Model {
        let mut tables = self.tables.lock().await;
        tables.next_ping_id += 1;
        ping.id = tables.next_ping_id;
        tables.pings.push(ping.clone());
        ping
    }
}

fn is_active_for(row: &shift::Model, tenant_id: Uuid) -> bool {
    row.tenant_id == tenant_id && row.status == ShiftStatus::Active
}

#[async_trait]
impl ShiftStore for MemoryStore {
    async fn insert_shift(&self, new_shift: NewShift) -> Result<shift::Model, StoreError> {
        let mut tables = self.tables.lock().await;
        let active = || tables.shifts.iter().filter(|s| is_active_for(s, new_shift.tenant_id));
        if active().any(|s| s.driver_id == new_shift.driver_id) {
            return Err(StoreError::UniqueViolation(ACTIVE_DRIVER_CONSTRAINT.to_string()));
        }
        if active().any(|s| s.truck_id == new_shift.truck_id) {
            return Err(StoreError::UniqueViolation(ACTIVE_TRUCK_CONSTRAINT.to_string()));
        }
        let now = Utc::now();
        let row = shift::Model {
            id: Uuid::new_v4(),
            tenant_id: new_shift.tenant_id,
            driver_id: new_shift.driver_id,
            truck_id: new_shift.truck_id,
            started_at: new_shift.started_at,
            ended_at: None,
            status: ShiftStatus::Active,
            total_km: 0.0,
            created_at: now,
            updated_at: now,
        };
        tables.shifts.push(row.clone());
        Ok(row)
    }

    async fn find_active_shift_for_driver(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
    ) -> Result<Option<shift::Model>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .shifts
            .iter()
            .find(|s| is_active_for(s, tenant_id) && s.driver_id == driver_id)
            .cloned())
    }

    async fn is_truck_in_use(&self, tenant_id: Uuid, truck_id: Uuid) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .shifts
            .iter()
            .any(|s| is_active_for(s, tenant_id) && s.truck_id == truck_id))
    }

    async fn complete_shift(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
        shift_id: Uuid,
        total_km: f64,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<shift::Model>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables
            .shifts
            .iter_mut()
            .find(|s| s.id == shift_id && is_active_for(s, tenant_id) && s.driver_id == driver_id)
        else {
            return Ok(None);
        };
        row.status = ShiftStatus::Completed;
        row.ended_at = Some(ended_at);
        row.total_km = total_km;
        row.updated_at = ended_at;
        Ok(Some(row.clone()))
    }

    async fn find_all_active_shifts(&self) -> Result<Vec<shift::Model>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .shifts
            .iter()
            .filter(|s| s.status == ShiftStatus::Active)
            .cloned()
            .collect())
    }

    async fn find_active_shifts_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<shift::Model>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .shifts
            .iter()
            .filter(|s| is_active_for(s, tenant_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PingStore for MemoryStore {
    async fn insert_pings(&self, pings: Vec<NewPing>) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.fail_ping_writes {
            return Err(StoreError::Database("ping write rejected".to_string()));
        }
        let count = pings.len();
        for ping in pings {
            tables.next_ping_id += 1;
            let row = gps_ping::Model {
                id: tables.next_ping_id,
                tenant_id: ping.tenant_id,
                driver_id: ping.driver_id,
                truck_id: ping.truck_id,
                shift_id: ping.shift_id,
                latitude: ping.latitude,
                longitude: ping.longitude,
                speed_kmh: ping.speed_kmh,
                heading: ping.heading,
                accuracy: ping.accuracy,
                battery_level: ping.battery_level,
                is_moving: ping.is_moving,
                recorded_at: ping.recorded_at,
                received_at: ping.received_at,
                is_delayed: ping.is_delayed,
                created_at: ping.received_at,
            };
            tables.pings.push(row);
        }
        Ok(count)
    }

    async fn find_pings_for_shift(
        &self,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Vec<gps_ping::Model>, StoreError> {
        let tables = self.tables.lock().await;
        let mut pings: Vec<_> = tables
            .pings
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.shift_id == shift_id)
            .cloned()
            .collect();
        pings.sort_by_key(|p| (p.recorded_at, p.id));
        Ok(pings)
    }

    async fn find_latest_ping_for_shift(
        &self,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Option<gps_ping::Model>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .pings
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.shift_id == shift_id)
            .max_by_key(|p| (p.recorded_at, p.id))
            .cloned())
    }

    async fn find_latest_pings_for_tenant(
        &self,
        tenant_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<gps_ping::Model>, StoreError> {
        let tables = self.tables.lock().await;
        let mut latest: HashMap<Uuid, &gps_ping::Model> = HashMap::new();
        for ping in tables
            .pings
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.recorded_at >= since)
        {
            latest
                .entry(ping.driver_id)
                .and_modify(|current| {
                    if (ping.recorded_at, ping.id) > (current.recorded_at, current.id) {
                        *current = ping;
                    }
                })
                .or_insert(ping);
        }
        let mut rows: Vec<_> = latest.into_values().cloned().collect();
        rows.sort_by_key(|p| p.driver_id);
        Ok(rows)
    }
}

#[async_trait]
impl ZoneStore for MemoryStore {
    async fn find_zones_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<approved_zone::Model>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .zones
            .iter()
            .filter(|z| z.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert_zone(
        &self,
        tenant_id: Uuid,
        input: ZoneInput,
    ) -> Result<approved_zone::Model, StoreError> {
        let now = Utc::now();
        let row = approved_zone::Model {
            id: Uuid::new_v4(),
            tenant_id,
            label: input.label,
            latitude: input.latitude,
            longitude: input.longitude,
            // Whole meters, like the INT column.
            radius_meters: input.radius_meters.round(),
            zone_type: input.zone_type,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.zones.push(row.clone());
        Ok(row)
    }

    async fn update_zone(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        input: ZoneInput,
    ) -> Result<Option<approved_zone::Model>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables
            .zones
            .iter_mut()
            .find(|z| z.id == zone_id && z.tenant_id == tenant_id)
        else {
            return Ok(None);
        };
        row.label = input.label;
        row.latitude = input.latitude;
        row.longitude = input.longitude;
        row.radius_meters = input.radius_meters.round();
        row.zone_type = input.zone_type;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn delete_zone(&self, tenant_id: Uuid, zone_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.zones.len();
        tables
            .zones
            .retain(|z| !(z.id == zone_id && z.tenant_id == tenant_id));
        Ok(tables.zones.len() != before)
    }
}

#[async_trait]
impl AlertConfigStore for MemoryStore {
    async fn find_alert_config(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<alert_config::Model>, StoreError> {
        Ok(self.tables.lock().await.alert_configs.get(&tenant_id).cloned())
    }

    async fn upsert_alert_config(
        &self,
        tenant_id: Uuid,
        input: AlertConfigInput,
    ) -> Result<alert_config::Model, StoreError> {
        let mut tables = self.tables.lock().await;
        let id = tables
            .alert_configs
            .get(&tenant_id)
            .map(|c| c.id)
            .unwrap_or_else(Uuid::new_v4);
        let row = alert_config::Model {
            id,
            tenant_id,
            max_stop_duration_minutes: input.max_stop_duration_minutes,
            alert_on_driver_offline: input.alert_on_driver_offline,
            offline_threshold_minutes: input.offline_threshold_minutes,
            notify_via_push: input.notify_via_push,
            notify_via_email: input.notify_via_email,
            notify_via_sms: input.notify_via_sms,
            updated_at: Utc::now(),
        };
        tables.alert_configs.insert(tenant_id, row.clone());
        Ok(row)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert_alert(&self, new_alert: NewAlert) -> Result<alert::Model, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.fail_alert_writes.contains(&new_alert.alert_type) {
            return Err(StoreError::Database("alert write rejected".to_string()));
        }
        let row = alert::Model {
            id: Uuid::new_v4(),
            tenant_id: new_alert.tenant_id,
            driver_id: new_alert.driver_id,
            shift_id: new_alert.shift_id,
            alert_type: new_alert.alert_type,
            status: AlertStatus::Triggered,
            stop_latitude: new_alert.stop_latitude,
            stop_longitude: new_alert.stop_longitude,
            stop_duration_seconds: new_alert.stop_duration_seconds,
            nearest_zone_id: new_alert.nearest_zone_id,
            nearest_zone_distance_meters: new_alert.nearest_zone_distance_meters,
            manager_notes: None,
            triggered_at: new_alert.triggered_at,
            notified_at: Some(new_alert.triggered_at),
            acknowledged_at: None,
            resolved_at: None,
            created_at: new_alert.triggered_at,
        };
        tables.alerts.push(row.clone());
        Ok(row)
    }

    async fn find_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
    ) -> Result<Option<alert::Model>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .alerts
            .iter()
            .find(|a| a.id == alert_id && a.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_alerts(
        &self,
        tenant_id: Uuid,
        filter: AlertFilter,
    ) -> Result<AlertPage, StoreError> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<_> = tables
            .alerts
            .iter()
            .filter(|a| a.tenant_id == tenant_id)
            .filter(|a| filter.status.is_none_or(|s| s == a.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        let total = matching.len() as u64;
        let alerts = matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok(AlertPage { alerts, total })
    }

    async fn transition_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
        transition: AlertTransition,
        at: DateTime<Utc>,
    ) -> Result<Option<alert::Model>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(row) = tables.alerts.iter_mut().find(|a| {
            a.id == alert_id
                && a.tenant_id == tenant_id
                && transition.allowed_from().contains(&a.status)
        }) else {
            return Ok(None);
        };
        transition.apply(row, at);
        Ok(Some(row.clone()))
    }

    async fn has_recent_alert(&self, query: RecentAlertQuery) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.alerts.iter().any(|a| query.matches(a)))
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn find_driver(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
    ) -> Result<Option<driver::Model>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .drivers
            .get(&driver_id)
            .filter(|d| d.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_vehicle(
        &self,
        tenant_id: Uuid,
        vehicle_id: Uuid,
    ) -> Result<Option<vehicle::Model>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .vehicles
            .get(&vehicle_id)
            .filter(|v| v.tenant_id == tenant_id)
            .cloned())
    }
}
