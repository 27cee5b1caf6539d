use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use fleet_tracker::alerting::evaluation_service::EvaluationService;
use fleet_tracker::db::enums::{AlertType, ZoneType};
use fleet_tracker::db::memory::MemoryStore;
use fleet_tracker::db::store::{ZoneInput, ZoneStore};
use fleet_tracker::server::hub::{ClientSubscription, HubConfig, HubHandle};
use fleet_tracker::tracking::TrackingError;
use fleet_tracker::tracking::geofence::GeofenceMatcher;
use fleet_tracker::tracking::ingestion::{IngestionService, RawPing};
use fleet_tracker::tracking::rate_limiter::RateLimiter;
use fleet_tracker::tracking::shift_manager::ShiftManager;

struct Harness {
    store: Arc<MemoryStore>,
    shifts: Arc<ShiftManager>,
    ingestion: IngestionService,
    evaluation: EvaluationService,
    hub: HubHandle,
}

fn harness(rate_window: Duration) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let hub = HubHandle::spawn(HubConfig::default());
    let shifts = Arc::new(ShiftManager::new(store.clone(), store.clone()));
    let ingestion = IngestionService::new(
        RateLimiter::new(rate_window),
        shifts.clone(),
        store.clone(),
        store.clone(),
        hub.clone(),
    );
    let evaluation = EvaluationService::new(
        shifts.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(GeofenceMatcher::new(store.clone())),
        hub.clone(),
    );
    Harness {
        store,
        shifts,
        ingestion,
        evaluation,
        hub,
    }
}

fn raw(latitude: f64, longitude: f64, is_moving: bool, minutes_ago: i64) -> RawPing {
    RawPing {
        latitude,
        longitude,
        speed_kmh: if is_moving { 60.0 } else { 0.0 },
        heading: 90,
        accuracy: 5.0,
        battery_level: 80,
        is_moving,
        recorded_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
    }
}

/// Messages the hub has delivered to `sub` so far. `client_count` is
/// handled after every earlier publish, so it doubles as a barrier.
async fn drain(hub: &HubHandle, sub: &mut ClientSubscription) -> Vec<serde_json::Value> {
    hub.client_count(None).await.unwrap();
    let mut messages = Vec::new();
    while let Ok(payload) = sub.receiver.try_recv() {
        messages.push(serde_json::from_str(&payload).unwrap());
    }
    messages
}

#[tokio::test]
async fn test_shift_ping_and_end_flow() {
    let h = harness(Duration::from_secs(5));
    let tenant = Uuid::new_v4();
    let driver = h.store.add_driver(tenant, "Ana", "Lopez").await;
    let truck = h.store.add_vehicle(tenant, "ABC-123").await;
    let mut same_tenant = h.hub.register(tenant).await.unwrap();
    let mut other_tenant = h.hub.register(Uuid::new_v4()).await.unwrap();

    let shift = h.shifts.start(tenant, driver, truck).await.unwrap();
    let outcome = h
        .ingestion
        .ingest(tenant, driver, vec![raw(0.0, 0.0, true, 0), raw(0.0, 1.0, true, 0)])
        .await
        .unwrap();
    assert_eq!(outcome.accepted, 2);

    let messages = drain(&h.hub, &mut same_tenant).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "tracking");
    let data = &messages[0]["data"];
    assert_eq!(data["driver_name"], "Ana Lopez");
    assert_eq!(data["truck_plate"], "ABC-123");
    assert_eq!(data["shift_id"], shift.id.to_string());
    assert_eq!(data["lng"], 1.0);
    assert!(drain(&h.hub, &mut other_tenant).await.is_empty());

    let ended = h.shifts.end(tenant, driver, shift.id).await.unwrap();
    assert!((ended.total_km - 111.19).abs() < 0.01, "got {}", ended.total_km);
    assert!(ended.ended_at.is_some());

    let again = h.shifts.end(tenant, driver, shift.id).await;
    assert!(matches!(again, Err(TrackingError::NotFound(_))));
}

#[tokio::test]
async fn test_rate_limit_applies_before_shift_lookup() {
    let h = harness(Duration::from_secs(60));
    let tenant = Uuid::new_v4();
    let driver = Uuid::new_v4();

    let first = h.ingestion.ingest(tenant, driver, vec![raw(1.0, 1.0, true, 0)]).await;
    assert!(matches!(first, Err(TrackingError::NoActiveShift)));

    let second = h.ingestion.ingest(tenant, driver, vec![raw(1.0, 1.0, true, 0)]).await;
    match second {
        Err(TrackingError::RateLimited { retry_after }) => {
            assert!(retry_after <= Duration::from_secs(60));
            assert!(retry_after > Duration::from_secs(55));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pings_are_normalized_and_bound_to_the_shift() {
    let h = harness(Duration::from_millis(1));
    let tenant = Uuid::new_v4();
    let driver = Uuid::new_v4();
    let truck = Uuid::new_v4();
    let shift = h.shifts.start(tenant, driver, truck).await.unwrap();

    let mut wild = raw(10.0, 10.0, true, 5);
    wild.speed_kmh = 350.0;
    wild.heading = -90;
    wild.battery_level = 140;
    let outcome = h
        .ingestion
        .ingest(tenant, driver, vec![wild, raw(95.0, 10.0, true, 0)])
        .await
        .unwrap();
    assert_eq!(outcome.accepted, 1);

    let pings = h.store.all_pings().await;
    assert_eq!(pings.len(), 1);
    let ping = &pings[0];
    assert_eq!(ping.shift_id, shift.id);
    assert_eq!(ping.truck_id, truck);
    assert_eq!(ping.speed_kmh, 0.0);
    assert_eq!(ping.heading, 270);
    assert_eq!(ping.battery_level, 100);
    assert!(ping.is_delayed);
}

#[tokio::test]
async fn test_oversized_batch_is_rejected() {
    let h = harness(Duration::from_millis(1));
    let tenant = Uuid::new_v4();
    let driver = Uuid::new_v4();
    h.shifts.start(tenant, driver, Uuid::new_v4()).await.unwrap();

    let batch = (0..101).map(|_| raw(1.0, 1.0, true, 0)).collect();
    let result = h.ingestion.ingest(tenant, driver, batch).await;
    assert!(matches!(result, Err(TrackingError::Validation(_))));
    assert!(h.store.all_pings().await.is_empty());
}

#[tokio::test]
async fn test_failed_batch_write_publishes_nothing() {
    let h = harness(Duration::from_millis(1));
    let tenant = Uuid::new_v4();
    let driver = Uuid::new_v4();
    h.shifts.start(tenant, driver, Uuid::new_v4()).await.unwrap();
    let mut sub = h.hub.register(tenant).await.unwrap();

    h.store.fail_ping_writes(true).await;
    let result = h
        .ingestion
        .ingest(tenant, driver, vec![raw(1.0, 1.0, true, 0), raw(1.1, 1.0, true, 0)])
        .await;
    assert!(matches!(result, Err(TrackingError::Store(_))));
    assert!(h.store.all_pings().await.is_empty());
    assert!(drain(&h.hub, &mut sub).await.is_empty());
}

#[tokio::test]
async fn test_concurrent_starts_for_one_driver_admit_one() {
    let h = harness(Duration::from_secs(5));
    let tenant = Uuid::new_v4();
    let driver = Uuid::new_v4();

    let (a, b) = tokio::join!(
        h.shifts.start(tenant, driver, Uuid::new_v4()),
        h.shifts.start(tenant, driver, Uuid::new_v4()),
    );
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(TrackingError::AlreadyActive))));
    assert_eq!(h.shifts.get_active_for_tenant(tenant).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_truck_exclusivity_is_per_tenant() {
    let h = harness(Duration::from_secs(5));
    let tenant = Uuid::new_v4();
    let truck = Uuid::new_v4();

    h.shifts.start(tenant, Uuid::new_v4(), truck).await.unwrap();
    let taken = h.shifts.start(tenant, Uuid::new_v4(), truck).await;
    assert!(matches!(taken, Err(TrackingError::TruckInUse)));

    // Same id under another tenant is a different truck.
    assert!(h.shifts.start(Uuid::new_v4(), Uuid::new_v4(), truck).await.is_ok());
    assert_eq!(h.shifts.get_all_active().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_stale_stop_raises_offline_and_unauthorized_stop() {
    let h = harness(Duration::from_millis(1));
    let tenant = Uuid::new_v4();
    let driver = h.store.add_driver(tenant, "Ben", "Ode").await;
    let truck = h.store.add_vehicle(tenant, "XY-99").await;
    let depot = h
        .store
        .insert_zone(
            tenant,
            ZoneInput {
                label: "Depot".to_string(),
                latitude: 0.0,
                longitude: 0.0,
                radius_meters: 200.0,
                zone_type: ZoneType::Warehouse,
            },
        )
        .await
        .unwrap();
    let mut sub = h.hub.register(tenant).await.unwrap();
    let mut outsider = h.hub.register(Uuid::new_v4()).await.unwrap();

    let shift = h.shifts.start(tenant, driver, truck).await.unwrap();
    h.ingestion
        .ingest(tenant, driver, vec![raw(0.0, 0.01, false, 10)])
        .await
        .unwrap();

    let report = h.evaluation.run_evaluation_cycle(Utc::now()).await;
    assert_eq!(report.shifts_checked, 1);
    assert_eq!(report.alerts_raised, 2);
    assert_eq!(report.failures, 0);

    let alerts = h.store.all_alerts().await;
    let types: HashSet<AlertType> = alerts.iter().map(|a| a.alert_type).collect();
    assert!(types.contains(&AlertType::DriverOffline));
    assert!(types.contains(&AlertType::UnauthorizedStop));
    let stop = alerts
        .iter()
        .find(|a| a.alert_type == AlertType::UnauthorizedStop)
        .unwrap();
    assert_eq!(stop.shift_id, Some(shift.id));
    assert_eq!(stop.nearest_zone_id, Some(depot.id));
    assert!(stop.stop_duration_seconds >= 600);
    let distance = stop.nearest_zone_distance_meters.unwrap();
    assert!((distance - 1111.95).abs() < 1.0, "got {distance}");

    let messages = drain(&h.hub, &mut sub).await;
    let kinds: Vec<&str> = messages.iter().filter_map(|m| m["type"].as_str()).collect();
    assert_eq!(kinds, vec!["tracking", "alert", "alert"]);
    assert!(drain(&h.hub, &mut outsider).await.is_empty());
}
