use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::entities::{gps_ping, shift};
use crate::db::store::{
    ACTIVE_DRIVER_CONSTRAINT, ACTIVE_TRUCK_CONSTRAINT, NewShift, PingStore, ShiftStore,
    StoreError,
};
use crate::geo;
use crate::tracking::TrackingError;

/// Sum of the great-circle distances between consecutive pings, in km.
/// Callers pass pings ordered by `recorded_at`.
pub fn path_length_km(pings: &[gps_ping::Model]) -> f64 {
    pings
        .windows(2)
        .map(|pair| {
            geo::distance_km(
                pair[0].latitude,
                pair[0].longitude,
                pair[1].latitude,
                pair[1].longitude,
            )
        })
        .sum()
}

pub struct ShiftManager {
    shifts: Arc<dyn ShiftStore>,
    pings: Arc<dyn PingStore>,
}

impl ShiftManager {
    pub fn new(shifts: Arc<dyn ShiftStore>, pings: Arc<dyn PingStore>) -> Self {
        Self { shifts, pings }
    }

    pub async fn start(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
        truck_id: Uuid,
    ) -> Result<shift::Model, TrackingError> {
        // Fast path only. The unique indexes settle concurrent starts.
        if self
            .shifts
            .find_active_shift_for_driver(tenant_id, driver_id)
            .await?
            .is_some()
        {
            return Err(TrackingError::AlreadyActive);
        }
        if self.shifts.is_truck_in_use(tenant_id, truck_id).await? {
            return Err(TrackingError::TruckInUse);
        }

        let new_shift = NewShift {
            tenant_id,
            driver_id,
            truck_id,
            started_at: Utc::now(),
        };
        match self.shifts.insert_shift(new_shift).await {
            Ok(shift) => {
                info!(%tenant_id, %driver_id, %truck_id, shift_id = %shift.id, "Shift started.");
                Ok(shift)
            }
            Err(StoreError::UniqueViolation(constraint)) => {
                warn!(%tenant_id, %driver_id, %truck_id, %constraint, "Concurrent shift start rejected.");
                Err(conflict_for_constraint(&constraint))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn end(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
        shift_id: Uuid,
    ) -> Result<shift::Model, TrackingError> {
        let pings = self.pings.find_pings_for_shift(tenant_id, shift_id).await?;
        let total_km = path_length_km(&pings);

        let completed = self
            .shifts
            .complete_shift(tenant_id, driver_id, shift_id, total_km, Utc::now())
            .await?
            .ok_or_else(|| TrackingError::NotFound("active shift not found".to_string()))?;
        info!(
            %tenant_id,
            %driver_id,
            %shift_id,
            total_km,
            ping_count = pings.len(),
            "Shift completed."
        );
        Ok(completed)
    }

    pub async fn get_active(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
    ) -> Result<shift::Model, TrackingError> {
        self.shifts
            .find_active_shift_for_driver(tenant_id, driver_id)
            .await?
            .ok_or_else(|| TrackingError::NotFound("no active shift".to_string()))
    }

    /// Active shifts across all tenants.
    pub async fn get_all_active(&self) -> Result<Vec<shift::Model>, TrackingError> {
        Ok(self.shifts.find_all_active_shifts().await?)
    }

    pub async fn get_active_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<shift::Model>, TrackingError> {
        Ok(self.shifts.find_active_shifts_for_tenant(tenant_id).await?)
    }
}

fn conflict_for_constraint(constraint: &str) -> TrackingError {
    match constraint {
        ACTIVE_TRUCK_CONSTRAINT => TrackingError::TruckInUse,
        ACTIVE_DRIVER_CONSTRAINT => TrackingError::AlreadyActive,
        // Unknown constraint names fall back to the driver-side conflict.
        _ => TrackingError::AlreadyActive,
    }
}
