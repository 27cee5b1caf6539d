//! PostgreSQL-backed storage through sea-orm. Each submodule holds the
//! queries for one table; [`PgStore`] wires them into the storage traits.

pub mod alert_config_service;
pub mod alert_service;
pub mod directory_service;
pub mod ping_service;
pub mod shift_service;
pub mod zone_service;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::db::entities::{alert, alert_config, approved_zone, driver, gps_ping, shift, vehicle};
use crate::db::store::{
    AlertConfigInput, AlertConfigStore, AlertFilter, AlertPage, AlertStore, AlertTransition,
    Directory, NewAlert, NewPing, NewShift, PingStore, RecentAlertQuery, ShiftStore, StoreError,
    ZoneInput, ZoneStore,
};

#[derive(Clone)]
pub struct PgStore {
    db: DatabaseConnection,
}

impl PgStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl ShiftStore for PgStore {
    async fn insert_shift(&self, new_shift: NewShift) -> Result<shift::Model, StoreError> {
        Ok(shift_service::create_shift(&self.db, new_shift).await?)
    }

    async fn find_active_shift_for_driver(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
    ) -> Result<Option<shift::Model>, StoreError> {
        Ok(shift_service::get_active_shift_for_driver(&self.db, tenant_id, driver_id).await?)
    }

    async fn is_truck_in_use(&self, tenant_id: Uuid, truck_id: Uuid) -> Result<bool, StoreError> {
        Ok(shift_service::is_truck_in_use(&self.db, tenant_id, truck_id).await?)
    }

    async fn complete_shift(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
        shift_id: Uuid,
        total_km: f64,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<shift::Model>, StoreError> {
        Ok(
            shift_service::complete_shift(&self.db, tenant_id, driver_id, shift_id, total_km, ended_at)
                .await?,
        )
    }

    async fn find_all_active_shifts(&self) -> Result<Vec<shift::Model>, StoreError> {
        Ok(shift_service::get_active_shifts(&self.db, None).await?)
    }

    async fn find_active_shifts_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<shift::Model>, StoreError> {
        Ok(shift_service::get_active_shifts(&self.db, Some(tenant_id)).await?)
    }
}

#[async_trait]
impl PingStore for PgStore {
    async fn insert_pings(&self, pings: Vec<NewPing>) -> Result<usize, StoreError> {
        Ok(ping_service::insert_pings(&self.db, pings).await?)
    }

    async fn find_pings_for_shift(
        &self,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Vec<gps_ping::Model>, StoreError> {
        Ok(ping_service::get_pings_for_shift(&self.db, tenant_id, shift_id).await?)
    }

    async fn find_latest_ping_for_shift(
        &self,
        tenant_id: Uuid,
        shift_id: Uuid,
    ) -> Result<Option<gps_ping::Model>, StoreError> {
        Ok(ping_service::get_latest_ping_for_shift(&self.db, tenant_id, shift_id).await?)
    }

    async fn find_latest_pings_for_tenant(
        &self,
        tenant_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<gps_ping::Model>, StoreError> {
        Ok(ping_service::get_latest_pings_for_tenant(&self.db, tenant_id, since).await?)
    }
}

#[async_trait]
impl ZoneStore for PgStore {
    async fn find_zones_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<approved_zone::Model>, StoreError> {
        Ok(zone_service::get_zones_for_tenant(&self.db, tenant_id).await?)
    }

    async fn insert_zone(
        &self,
        tenant_id: Uuid,
        input: ZoneInput,
    ) -> Result<approved_zone::Model, StoreError> {
        Ok(zone_service::create_zone(&self.db, tenant_id, input).await?)
    }

    async fn update_zone(
        &self,
        tenant_id: Uuid,
        zone_id: Uuid,
        input: ZoneInput,
    ) -> Result<Option<approved_zone::Model>, StoreError> {
        Ok(zone_service::update_zone(&self.db, tenant_id, zone_id, input).await?)
    }

    async fn delete_zone(&self, tenant_id: Uuid, zone_id: Uuid) -> Result<bool, StoreError> {
        Ok(zone_service::delete_zone(&self.db, tenant_id, zone_id).await?)
    }
}

#[async_trait]
impl AlertConfigStore for PgStore {
    async fn find_alert_config(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<alert_config::Model>, StoreError> {
        Ok(alert_config_service::get_alert_config(&self.db, tenant_id).await?)
    }

    async fn upsert_alert_config(
        &self,
        tenant_id: Uuid,
        input: AlertConfigInput,
    ) -> Result<alert_config::Model, StoreError> {
        Ok(alert_config_service::upsert_alert_config(&self.db, tenant_id, input).await?)
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn insert_alert(&self, new_alert: NewAlert) -> Result<alert::Model, StoreError> {
        Ok(alert_service::create_alert(&self.db, new_alert).await?)
    }

    async fn find_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
    ) -> Result<Option<alert::Model>, StoreError> {
        Ok(alert_service::get_alert(&self.db, tenant_id, alert_id).await?)
    }

    async fn list_alerts(
        &self,
        tenant_id: Uuid,
        filter: AlertFilter,
    ) -> Result<AlertPage, StoreError> {
        Ok(alert_service::list_alerts(&self.db, tenant_id, filter).await?)
    }

    async fn transition_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
        transition: AlertTransition,
        at: DateTime<Utc>,
    ) -> Result<Option<alert::Model>, StoreError> {
        Ok(alert_service::transition_alert(&self.db, tenant_id, alert_id, transition, at).await?)
    }

    async fn has_recent_alert(&self, query: RecentAlertQuery) -> Result<bool, StoreError> {
        Ok(alert_service::has_recent_alert(&self.db, query).await?)
    }
}

#[async_trait]
impl Directory for PgStore {
    async fn find_driver(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
    ) -> Result<Option<driver::Model>, StoreError> {
        Ok(directory_service::get_driver(&self.db, tenant_id, driver_id).await?)
    }

    async fn find_vehicle(
        &self,
        tenant_id: Uuid,
        vehicle_id: Uuid,
    ) -> Result<Option<vehicle::Model>, StoreError> {
        Ok(directory_service::get_vehicle(&self.db, tenant_id, vehicle_id).await?)
    }
}
