use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::entities::shift;
use crate::db::store::{Directory, NewPing, PingStore};
use crate::server::hub::HubHandle;
use crate::tracking::TrackingError;
use crate::tracking::rate_limiter::RateLimiter;
use crate::tracking::shift_manager::ShiftManager;
use crate::web::models::websocket_models::{TrackingUpdate, WsMessage};

pub const MAX_BATCH_SIZE: usize = 100;
pub const MAX_SPEED_KMH: f64 = 200.0;
/// Pings that reach the server later than this after being recorded are
/// flagged as delayed.
pub const DELAY_THRESHOLD: ChronoDuration = ChronoDuration::minutes(2);

/// A ping as sent by the driver app. Any truck or shift id the client
/// includes is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPing {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed_kmh: f64,
    #[serde(default)]
    pub heading: i32,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub battery_level: i32,
    #[serde(default)]
    pub is_moving: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub accepted: usize,
}

/// Turns a raw ping into a storable row, or `None` when the coordinates
/// are out of range.
pub fn normalize_ping(
    raw: &RawPing,
    shift: &shift::Model,
    received_at: DateTime<Utc>,
) -> Option<NewPing> {
    if !(-90.0..=90.0).contains(&raw.latitude) || !(-180.0..=180.0).contains(&raw.longitude) {
        return None;
    }
    let speed_kmh = if (0.0..=MAX_SPEED_KMH).contains(&raw.speed_kmh) {
        raw.speed_kmh
    } else {
        0.0
    };
    Some(NewPing {
        tenant_id: shift.tenant_id,
        driver_id: shift.driver_id,
        truck_id: shift.truck_id,
        shift_id: shift.id,
        latitude: raw.latitude,
        longitude: raw.longitude,
        speed_kmh,
        heading: raw.heading.rem_euclid(360),
        accuracy: raw.accuracy,
        battery_level: raw.battery_level.clamp(0, 100),
        is_moving: raw.is_moving,
        recorded_at: raw.recorded_at,
        received_at,
        is_delayed: received_at - raw.recorded_at > DELAY_THRESHOLD,
    })
}

pub struct IngestionService {
    rate_limiter: RateLimiter,
    shifts: Arc<ShiftManager>,
    pings: Arc<dyn PingStore>,
    directory: Arc<dyn Directory>,
    hub: HubHandle,
}

impl IngestionService {
    pub fn new(
        rate_limiter: RateLimiter,
        shifts: Arc<ShiftManager>,
        pings: Arc<dyn PingStore>,
        directory: Arc<dyn Directory>,
        hub: HubHandle,
    ) -> Self {
        Self {
            rate_limiter,
            shifts,
            pings,
            directory,
            hub,
        }
    }

    pub async fn ingest(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
        batch: Vec<RawPing>,
    ) -> Result<IngestOutcome, TrackingError> {
        self.rate_limiter
            .check(driver_id)
            .map_err(|retry_after| TrackingError::RateLimited { retry_after })?;

        if batch.is_empty() || batch.len() > MAX_BATCH_SIZE {
            return Err(TrackingError::Validation(format!(
                "batch must contain between 1 and {MAX_BATCH_SIZE} pings, got {}",
                batch.len()
            )));
        }

        let shift = self
            .shifts
            .get_active(tenant_id, driver_id)
            .await
            .map_err(|e| match e {
                TrackingError::NotFound(_) => TrackingError::NoActiveShift,
                other => other,
            })?;

        let received_at = Utc::now();
        let rows: Vec<NewPing> = batch
            .iter()
            .filter_map(|raw| normalize_ping(raw, &shift, received_at))
            .collect();
        let skipped = batch.len() - rows.len();
        if skipped > 0 {
            debug!(%driver_id, skipped, "Dropped pings with out-of-range coordinates.");
        }
        // Devices may flush buffered pings out of order. Ties keep batch order.
        let Some(last) = rows.iter().max_by_key(|p| p.recorded_at).cloned() else {
            return Ok(IngestOutcome { accepted: 0 });
        };

        let accepted = self.pings.insert_pings(rows).await?;
        info!(%tenant_id, %driver_id, shift_id = %shift.id, accepted, skipped, "Stored ping batch.");

        self.publish_position(&shift, &last).await;
        Ok(IngestOutcome { accepted })
    }

    async fn publish_position(&self, shift: &shift::Model, ping: &NewPing) {
        let driver_name = match self.directory.find_driver(shift.tenant_id, shift.driver_id).await {
            Ok(driver) => driver.map(|d| d.display_name()).unwrap_or_default(),
            Err(e) => {
                warn!(driver_id = %shift.driver_id, error = %e, "Driver lookup failed for live update.");
                String::new()
            }
        };
        let truck_plate = match self.directory.find_vehicle(shift.tenant_id, shift.truck_id).await {
            Ok(vehicle) => vehicle.and_then(|v| v.license_plate).unwrap_or_default(),
            Err(e) => {
                warn!(truck_id = %shift.truck_id, error = %e, "Vehicle lookup failed for live update.");
                String::new()
            }
        };

        let update = TrackingUpdate {
            driver_id: shift.driver_id,
            driver_name,
            truck_id: shift.truck_id,
            truck_plate,
            shift_id: shift.id,
            lat: ping.latitude,
            lng: ping.longitude,
            speed: ping.speed_kmh,
            heading: ping.heading,
            battery: ping.battery_level,
            is_moving: ping.is_moving,
            timestamp: ping.recorded_at,
        };
        if let Err(e) = self.hub.publish(shift.tenant_id, &WsMessage::Tracking(update)) {
            warn!(tenant_id = %shift.tenant_id, error = %e, "Failed to publish live position.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::ShiftStatus;
    use crate::db::memory::MemoryStore;
    use crate::server::hub::HubConfig;
    use std::time::Duration;

    fn shift() -> shift::Model {
        let now = Utc::now();
        shift::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            truck_id: Uuid::new_v4(),
            started_at: now,
            ended_at: None,
            status: ShiftStatus::Active,
            total_km: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    fn raw(lat: f64, lon: f64) -> RawPing {
        RawPing {
            latitude: lat,
            longitude: lon,
            speed_kmh: 42.0,
            heading: 180,
            accuracy: 4.0,
            battery_level: 77,
            is_moving: true,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_normalize_rejects_bad_coordinates() {
        let s = shift();
        let now = Utc::now();
        assert!(normalize_ping(&raw(91.0, 0.0), &s, now).is_none());
        assert!(normalize_ping(&raw(0.0, -180.5), &s, now).is_none());
        assert!(normalize_ping(&raw(-90.0, 180.0), &s, now).is_some());
    }

    #[test]
    fn test_normalize_sanitises_fields() {
        let s = shift();
        let mut r = raw(10.0, 10.0);
        r.speed_kmh = 250.0;
        r.heading = -90;
        r.battery_level = 140;
        let row = normalize_ping(&r, &s, Utc::now()).unwrap();
        assert_eq!(row.speed_kmh, 0.0);
        assert_eq!(row.heading, 270);
        assert_eq!(row.battery_level, 100);
        assert_eq!(row.shift_id, s.id);
        assert_eq!(row.truck_id, s.truck_id);
    }

    #[test]
    fn test_delay_flag() {
        let s = shift();
        let now = Utc::now();
        let mut r = raw(0.0, 0.0);
        r.recorded_at = now - ChronoDuration::minutes(3);
        assert!(normalize_ping(&r, &s, now).unwrap().is_delayed);
        r.recorded_at = now - ChronoDuration::minutes(1);
        assert!(!normalize_ping(&r, &s, now).unwrap().is_delayed);
    }

    async fn service(store: Arc<MemoryStore>) -> (IngestionService, Arc<ShiftManager>, HubHandle) {
        let shifts = Arc::new(ShiftManager::new(store.clone(), store.clone()));
        let hub = HubHandle::spawn(HubConfig::default());
        let service = IngestionService::new(
            RateLimiter::new(Duration::from_secs(5)),
            shifts.clone(),
            store.clone(),
            store,
            hub.clone(),
        );
        (service, shifts, hub)
    }

    #[tokio::test]
    async fn test_no_active_shift_is_forbidden() {
        let store = Arc::new(MemoryStore::new());
        let (service, _, _) = service(store).await;
        let err = service
            .ingest(Uuid::new_v4(), Uuid::new_v4(), vec![raw(0.0, 0.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::NoActiveShift));
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected_and_consumes_window() {
        let store = Arc::new(MemoryStore::new());
        let (service, _, _) = service(store).await;
        let driver = Uuid::new_v4();
        let batch = vec![raw(0.0, 0.0); MAX_BATCH_SIZE + 1];
        let err = service.ingest(Uuid::new_v4(), driver, batch).await.unwrap_err();
        assert!(matches!(err, TrackingError::Validation(_)));

        let err = service
            .ingest(Uuid::new_v4(), driver, vec![raw(0.0, 0.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_store_failure_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let (service, shifts, _) = service(store.clone()).await;
        let (tenant, driver) = (Uuid::new_v4(), Uuid::new_v4());
        shifts.start(tenant, driver, Uuid::new_v4()).await.unwrap();
        store.fail_ping_writes(true).await;

        let err = service
            .ingest(tenant, driver, vec![raw(1.0, 1.0), raw(1.1, 1.1)])
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::Store(_)));
        assert!(store.all_pings().await.is_empty());
    }

    #[tokio::test]
    async fn test_publishes_last_accepted_ping() {
        let store = Arc::new(MemoryStore::new());
        let (service, shifts, hub) = service(store.clone()).await;
        let tenant = Uuid::new_v4();
        let driver = store.add_driver(tenant, "Ana", "Ruiz").await;
        let truck = store.add_vehicle(tenant, "TRK-042").await;
        shifts.start(tenant, driver, truck).await.unwrap();
        let mut sub = hub.register(tenant).await.unwrap();

        let outcome = service
            .ingest(tenant, driver, vec![raw(1.0, 1.0), raw(2.0, 2.0), raw(95.0, 0.0)])
            .await
            .unwrap();
        assert_eq!(outcome.accepted, 2);

        let payload = sub.receiver.recv().await.unwrap();
        let WsMessage::Tracking(update) = serde_json::from_str(&payload).unwrap() else {
            panic!("expected a tracking message");
        };
        assert_eq!(update.driver_name, "Ana Ruiz");
        assert_eq!(update.truck_plate, "TRK-042");
        assert_eq!((update.lat, update.lng), (2.0, 2.0));
    }

    #[tokio::test]
    async fn test_publishes_newest_ping_of_unordered_batch() {
        let store = Arc::new(MemoryStore::new());
        let (service, shifts, hub) = service(store.clone()).await;
        let (tenant, driver) = (Uuid::new_v4(), Uuid::new_v4());
        shifts.start(tenant, driver, Uuid::new_v4()).await.unwrap();
        let mut sub = hub.register(tenant).await.unwrap();

        let now = Utc::now();
        let mut newest = raw(3.0, 3.0);
        newest.recorded_at = now - ChronoDuration::seconds(5);
        let mut oldest = raw(4.0, 4.0);
        oldest.recorded_at = now - ChronoDuration::seconds(30);
        service.ingest(tenant, driver, vec![newest, oldest]).await.unwrap();

        let payload = sub.receiver.recv().await.unwrap();
        let WsMessage::Tracking(update) = serde_json::from_str(&payload).unwrap() else {
            panic!("expected a tracking message");
        };
        assert_eq!((update.lat, update.lng), (3.0, 3.0));
    }

    #[tokio::test]
    async fn test_all_pings_filtered_stores_nothing() {
        let store = Arc::new(MemoryStore::new());
        let (service, shifts, _) = service(store.clone()).await;
        let (tenant, driver) = (Uuid::new_v4(), Uuid::new_v4());
        shifts.start(tenant, driver, Uuid::new_v4()).await.unwrap();
        let outcome = service.ingest(tenant, driver, vec![raw(100.0, 0.0)]).await.unwrap();
        assert_eq!(outcome.accepted, 0);
        assert!(store.all_pings().await.is_empty());
    }
}
