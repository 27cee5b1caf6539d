use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::entities::{alert_config, shift};
use crate::db::enums::AlertType;
use crate::db::store::{
    AlertConfigStore, AlertStore, NewAlert, PingStore, RecentAlertQuery, StoreError,
};
use crate::server::hub::HubHandle;
use crate::tracking::TrackingError;
use crate::tracking::geofence::GeofenceMatcher;
use crate::tracking::shift_manager::ShiftManager;
use crate::web::models::websocket_models::WsMessage;

pub const DEFAULT_EVALUATION_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Database error: {0}")]
    Store(#[from] StoreError),
    #[error("Zone lookup failed: {0}")]
    Tracking(#[from] TrackingError),
}

/// Suppresses re-raising an alert type for a driver while an open alert of
/// that type, triggered within the window, exists. Disabled by default, in
/// which case every cycle raises again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertDedupPolicy {
    window: Option<ChronoDuration>,
}

impl AlertDedupPolicy {
    pub fn disabled() -> Self {
        Self { window: None }
    }

    /// Windows too long for a `TimeDelta` saturate to the longest one.
    pub fn from_minutes(minutes: u64) -> Self {
        if minutes == 0 {
            return Self::disabled();
        }
        let window = i64::try_from(minutes)
            .ok()
            .and_then(ChronoDuration::try_minutes)
            .unwrap_or(ChronoDuration::MAX);
        Self { window: Some(window) }
    }

    /// Earliest trigger time still inside the window, floored at the Unix
    /// epoch. No alert predates it and PostgreSQL accepts it as a bound.
    fn since(window: ChronoDuration, triggered_at: DateTime<Utc>) -> DateTime<Utc> {
        triggered_at
            .checked_sub_signed(window)
            .map_or(DateTime::UNIX_EPOCH, |since| since.max(DateTime::UNIX_EPOCH))
    }

    pub fn window(&self) -> Option<ChronoDuration> {
        self.window
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub shifts_checked: usize,
    pub alerts_raised: usize,
    pub failures: usize,
}

pub struct EvaluationService {
    shifts: Arc<ShiftManager>,
    pings: Arc<dyn PingStore>,
    configs: Arc<dyn AlertConfigStore>,
    alerts: Arc<dyn AlertStore>,
    geofence: Arc<GeofenceMatcher>,
    hub: HubHandle,
    dedup: AlertDedupPolicy,
}

impl EvaluationService {
    pub fn new(
        shifts: Arc<ShiftManager>,
        pings: Arc<dyn PingStore>,
        configs: Arc<dyn AlertConfigStore>,
        alerts: Arc<dyn AlertStore>,
        geofence: Arc<GeofenceMatcher>,
        hub: HubHandle,
    ) -> Self {
        Self {
            shifts,
            pings,
            configs,
            alerts,
            geofence,
            hub,
            dedup: AlertDedupPolicy::disabled(),
        }
    }

    pub fn with_dedup(mut self, dedup: AlertDedupPolicy) -> Self {
        self.dedup = dedup;
        self
    }

    /// Runs a cycle every `period` until `shutdown` flips to true or its
    /// sender is dropped. A running cycle is never interrupted.
    pub async fn start_periodic_evaluation(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(period_secs = period.as_secs(), "Alert evaluation service started.");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first cycle runs one
        // period after startup.
        ticker.tick().await;

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = self.run_evaluation_cycle(Utc::now()).await;
                    debug!(
                        shifts = report.shifts_checked,
                        raised = report.alerts_raised,
                        failures = report.failures,
                        "Alert evaluation cycle finished."
                    );
                }
            }
        }
        info!("Alert evaluation service stopped.");
    }

    /// Evaluates every active shift against its tenant's policy as of `now`.
    pub async fn run_evaluation_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let shifts = match self.shifts.get_all_active().await {
            Ok(shifts) => shifts,
            Err(e) => {
                error!(error = %e, "Failed to load active shifts for alert evaluation.");
                return CycleReport::default();
            }
        };

        let mut report = CycleReport {
            shifts_checked: shifts.len(),
            ..CycleReport::default()
        };
        for shift in &shifts {
            match self.evaluate_shift(shift, now).await {
                Ok(raised) => report.alerts_raised += raised,
                Err(e) => {
                    report.failures += 1;
                    warn!(shift_id = %shift.id, tenant_id = %shift.tenant_id, error = %e, "Alert evaluation failed for shift.");
                }
            }
        }
        report
    }

    async fn evaluate_shift(
        &self,
        shift: &shift::Model,
        now: DateTime<Utc>,
    ) -> Result<usize, EvaluationError> {
        let config = self.alert_config_for(shift.tenant_id).await;
        let latest = self
            .pings
            .find_latest_ping_for_shift(shift.tenant_id, shift.id)
            .await?;
        let mut raised = 0;

        if config.alert_on_driver_offline {
            let threshold = ChronoDuration::minutes(i64::from(config.offline_threshold_minutes));
            let last_seen = latest.as_ref().map_or(shift.started_at, |p| p.recorded_at);
            if now - last_seen > threshold {
                let offline = NewAlert {
                    tenant_id: shift.tenant_id,
                    driver_id: shift.driver_id,
                    shift_id: Some(shift.id),
                    alert_type: AlertType::DriverOffline,
                    stop_latitude: None,
                    stop_longitude: None,
                    stop_duration_seconds: 0,
                    nearest_zone_id: None,
                    nearest_zone_distance_meters: None,
                    triggered_at: now,
                };
                // A failed offline write must not skip the stop check.
                match self.raise(offline).await {
                    Ok(true) => raised += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(shift_id = %shift.id, tenant_id = %shift.tenant_id, error = %e, "Failed to raise driver offline alert.");
                    }
                }
            }
        }

        let Some(ping) = latest else {
            return Ok(raised);
        };
        let stopped_for = now - ping.recorded_at;
        let max_stop = ChronoDuration::minutes(i64::from(config.max_stop_duration_minutes));
        if ping.is_moving || stopped_for <= max_stop {
            return Ok(raised);
        }

        let zone_match = self
            .geofence
            .match_point(shift.tenant_id, ping.latitude, ping.longitude)
            .await?;
        if zone_match.inside {
            return Ok(raised);
        }
        let stop = NewAlert {
            tenant_id: shift.tenant_id,
            driver_id: shift.driver_id,
            shift_id: Some(shift.id),
            alert_type: AlertType::UnauthorizedStop,
            stop_latitude: Some(ping.latitude),
            stop_longitude: Some(ping.longitude),
            stop_duration_seconds: i32::try_from(stopped_for.num_seconds()).unwrap_or(i32::MAX),
            nearest_zone_id: zone_match.nearest_zone_id,
            nearest_zone_distance_meters: zone_match.nearest_distance_meters,
            triggered_at: now,
        };
        if self.raise(stop).await? {
            raised += 1;
        }
        Ok(raised)
    }

    async fn alert_config_for(&self, tenant_id: Uuid) -> alert_config::Model {
        match self.configs.find_alert_config(tenant_id).await {
            Ok(Some(config)) => config,
            Ok(None) => alert_config::Model::defaults_for(tenant_id),
            Err(e) => {
                warn!(%tenant_id, error = %e, "Failed to load alert config, using defaults.");
                alert_config::Model::defaults_for(tenant_id)
            }
        }
    }

    /// Persists and publishes an alert. `Ok(false)` when the dedup policy
    /// suppressed it.
    async fn raise(&self, new_alert: NewAlert) -> Result<bool, StoreError> {
        if let Some(window) = self.dedup.window() {
            let query = RecentAlertQuery {
                tenant_id: new_alert.tenant_id,
                driver_id: new_alert.driver_id,
                alert_type: Some(new_alert.alert_type),
                since: AlertDedupPolicy::since(window, new_alert.triggered_at),
                open_only: true,
            };
            if self.alerts.has_recent_alert(query).await? {
                debug!(driver_id = %new_alert.driver_id, alert_type = %new_alert.alert_type, "Open alert already exists, skipping.");
                return Ok(false);
            }
        }

        let alert = self.alerts.insert_alert(new_alert).await?;
        info!(
            alert_id = %alert.id,
            tenant_id = %alert.tenant_id,
            driver_id = %alert.driver_id,
            alert_type = %alert.alert_type,
            "Alert triggered."
        );
        let tenant_id = alert.tenant_id;
        if let Err(e) = self.hub.publish(tenant_id, &WsMessage::Alert(alert)) {
            warn!(%tenant_id, error = %e, "Failed to publish alert.");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::gps_ping;
    use crate::db::memory::MemoryStore;
    use crate::db::store::{AlertConfigInput, ShiftStore, ZoneInput, ZoneStore};
    use crate::db::enums::ZoneType;
    use crate::server::hub::HubConfig;

    struct Fixture {
        store: Arc<MemoryStore>,
        shifts: Arc<ShiftManager>,
        hub: HubHandle,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let shifts = Arc::new(ShiftManager::new(store.clone(), store.clone()));
            Self { store, shifts, hub: HubHandle::spawn(HubConfig::default()) }
        }

        fn service(&self) -> EvaluationService {
            EvaluationService::new(
                self.shifts.clone(),
                self.store.clone(),
                self.store.clone(),
                self.store.clone(),
                Arc::new(GeofenceMatcher::new(self.store.clone())),
                self.hub.clone(),
            )
        }

        async fn ping(&self, shift: &shift::Model, lat: f64, lon: f64, moving: bool, at: DateTime<Utc>) {
            self.store
                .insert_raw_ping(gps_ping::Model {
                    id: 0,
                    tenant_id: shift.tenant_id,
                    driver_id: shift.driver_id,
                    truck_id: shift.truck_id,
                    shift_id: shift.id,
                    latitude: lat,
                    longitude: lon,
                    speed_kmh: 0.0,
                    heading: 0,
                    accuracy: 3.0,
                    battery_level: 60,
                    is_moving: moving,
                    recorded_at: at,
                    received_at: at,
                    is_delayed: false,
                    created_at: at,
                })
                .await;
        }
    }

    #[tokio::test]
    async fn test_stale_ping_raises_offline() {
        let fx = Fixture::new();
        let shift = fx.shifts.start(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let now = Utc::now();
        fx.ping(&shift, 1.0, 1.0, true, now - ChronoDuration::minutes(4)).await;

        let report = fx.service().run_evaluation_cycle(now).await;
        assert_eq!(report.alerts_raised, 1);
        let alerts = fx.store.all_alerts().await;
        assert_eq!(alerts[0].alert_type, AlertType::DriverOffline);
        assert_eq!(alerts[0].stop_latitude, None);
    }

    #[tokio::test]
    async fn test_fresh_shift_without_pings_is_quiet() {
        let fx = Fixture::new();
        fx.shifts.start(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let report = fx.service().run_evaluation_cycle(Utc::now()).await;
        assert_eq!(report, CycleReport { shifts_checked: 1, alerts_raised: 0, failures: 0 });
    }

    #[tokio::test]
    async fn test_shift_without_pings_goes_offline_after_threshold() {
        let fx = Fixture::new();
        let shift = fx.shifts.start(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let later = shift.started_at + ChronoDuration::minutes(4);
        let report = fx.service().run_evaluation_cycle(later).await;
        assert_eq!(report.alerts_raised, 1);
    }

    #[tokio::test]
    async fn test_offline_alerting_can_be_disabled() {
        let fx = Fixture::new();
        let tenant = Uuid::new_v4();
        fx.store
            .upsert_alert_config(tenant, AlertConfigInput {
                max_stop_duration_minutes: 5,
                alert_on_driver_offline: false,
                offline_threshold_minutes: 3,
                notify_via_push: true,
                notify_via_email: true,
                notify_via_sms: false,
            })
            .await
            .unwrap();
        let shift = fx.shifts.start(tenant, Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let later = shift.started_at + ChronoDuration::hours(1);
        assert_eq!(fx.service().run_evaluation_cycle(later).await.alerts_raised, 0);
    }

    #[tokio::test]
    async fn test_long_stop_outside_zones_raises_unauthorized_stop() {
        let fx = Fixture::new();
        let tenant = Uuid::new_v4();
        let zone = fx
            .store
            .insert_zone(tenant, ZoneInput {
                label: "Depot".into(),
                latitude: 0.0,
                longitude: 0.0,
                radius_meters: 100.0,
                zone_type: ZoneType::Warehouse,
            })
            .await
            .unwrap();
        let shift = fx.shifts.start(tenant, Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let mut sub = fx.hub.register(tenant).await.unwrap();
        let now = Utc::now();
        fx.ping(&shift, 0.0, 0.01, false, now - ChronoDuration::minutes(6)).await;

        // Stale enough to be offline too.
        let report = fx.service().run_evaluation_cycle(now).await;
        assert_eq!(report.alerts_raised, 2);

        let stop = fx
            .store
            .all_alerts()
            .await
            .into_iter()
            .find(|a| a.alert_type == AlertType::UnauthorizedStop)
            .unwrap();
        assert_eq!(stop.stop_duration_seconds, 360);
        assert_eq!(stop.nearest_zone_id, Some(zone.id));
        assert_eq!(stop.stop_longitude, Some(0.01));
        assert!(stop.nearest_zone_distance_meters.unwrap() > 1_000.0);

        // Commands are processed in order, so this waits for the fan-out.
        fx.hub.client_count(None).await.unwrap();
        let mut published = 0;
        while let Ok(payload) = sub.receiver.try_recv() {
            assert!(payload.contains("\"type\":\"alert\""));
            published += 1;
        }
        assert_eq!(published, 2);
    }

    #[tokio::test]
    async fn test_stop_inside_zone_is_quiet() {
        let fx = Fixture::new();
        let tenant = Uuid::new_v4();
        fx.store
            .insert_zone(tenant, ZoneInput {
                label: "Client".into(),
                latitude: 0.0,
                longitude: 0.0,
                radius_meters: 2_000.0,
                zone_type: ZoneType::ClientSite,
            })
            .await
            .unwrap();
        let shift = fx.shifts.start(tenant, Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let now = Utc::now();
        fx.ping(&shift, 0.0, 0.01, false, now - ChronoDuration::minutes(6)).await;
        // Raise the offline threshold so only the stop rule applies.
        fx.store
            .upsert_alert_config(tenant, AlertConfigInput {
                max_stop_duration_minutes: 5,
                alert_on_driver_offline: true,
                offline_threshold_minutes: 60,
                notify_via_push: true,
                notify_via_email: true,
                notify_via_sms: false,
            })
            .await
            .unwrap();
        assert_eq!(fx.service().run_evaluation_cycle(now).await.alerts_raised, 0);
    }

    #[tokio::test]
    async fn test_repeat_cycles_reraise_without_dedup() {
        let fx = Fixture::new();
        let shift = fx.shifts.start(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let later = shift.started_at + ChronoDuration::minutes(10);
        let service = fx.service();
        service.run_evaluation_cycle(later).await;
        service.run_evaluation_cycle(later + ChronoDuration::seconds(30)).await;
        assert_eq!(fx.store.all_alerts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_dedup_suppresses_open_alerts_in_window() {
        let fx = Fixture::new();
        let shift = fx.shifts.start(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let later = shift.started_at + ChronoDuration::minutes(10);
        let service = fx.service().with_dedup(AlertDedupPolicy::from_minutes(15));
        service.run_evaluation_cycle(later).await;
        let second = service.run_evaluation_cycle(later + ChronoDuration::seconds(30)).await;
        assert_eq!(second.alerts_raised, 0);
        assert_eq!(fx.store.all_alerts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let fx = Fixture::new();
        let service = Arc::new(fx.service());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(service.start_periodic_evaluation(Duration::from_millis(10), rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }

    #[test]
    fn test_dedup_zero_is_disabled() {
        assert_eq!(AlertDedupPolicy::from_minutes(0), AlertDedupPolicy::disabled());
        assert_eq!(AlertDedupPolicy::from_minutes(5).window(), Some(ChronoDuration::minutes(5)));
    }

    #[tokio::test]
    async fn test_new_shift_ignores_pings_of_previous_shift() {
        let fx = Fixture::new();
        let (tenant, driver, truck) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let first = fx.shifts.start(tenant, driver, truck).await.unwrap();
        fx.ping(&first, 0.0, 0.01, false, Utc::now() - ChronoDuration::hours(2)).await;
        fx.shifts.end(tenant, driver, first.id).await.unwrap();

        let second = fx.shifts.start(tenant, driver, truck).await.unwrap();
        let report = fx
            .service()
            .run_evaluation_cycle(second.started_at + ChronoDuration::minutes(1))
            .await;
        assert_eq!(report, CycleReport { shifts_checked: 1, alerts_raised: 0, failures: 0 });
        assert!(fx.store.all_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_offline_write_still_checks_stop() {
        let fx = Fixture::new();
        let shift = fx.shifts.start(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let now = Utc::now();
        fx.ping(&shift, 0.0, 0.01, false, now - ChronoDuration::minutes(6)).await;
        fx.store.fail_alert_writes(AlertType::DriverOffline).await;

        let report = fx.service().run_evaluation_cycle(now).await;
        assert_eq!(report.alerts_raised, 1);
        assert_eq!(report.failures, 0);
        let alerts = fx.store.all_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::UnauthorizedStop);
    }

    #[test]
    fn test_dedup_window_saturates() {
        let huge = AlertDedupPolicy::from_minutes(1_000_000_000_000_000);
        assert_eq!(huge.window(), Some(ChronoDuration::MAX));
        assert_eq!(
            AlertDedupPolicy::from_minutes(u64::MAX).window(),
            Some(ChronoDuration::MAX)
        );
        let now = Utc::now();
        assert_eq!(AlertDedupPolicy::since(ChronoDuration::MAX, now), DateTime::UNIX_EPOCH);
        assert_eq!(
            AlertDedupPolicy::since(ChronoDuration::minutes(5), now),
            now - ChronoDuration::minutes(5)
        );
    }

    #[tokio::test]
    async fn test_huge_dedup_window_still_suppresses() {
        let fx = Fixture::new();
        let shift = fx.shifts.start(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let later = shift.started_at + ChronoDuration::minutes(10);
        let service = fx
            .service()
            .with_dedup(AlertDedupPolicy::from_minutes(1_000_000_000_000));
        let first = service.run_evaluation_cycle(later).await;
        let second = service.run_evaluation_cycle(later + ChronoDuration::minutes(1)).await;
        assert_eq!(first.alerts_raised, 1);
        assert_eq!(second.alerts_raised, 0);
        assert_eq!(second.failures, 0);
    }

    #[tokio::test]
    async fn test_cycle_counts_shifts_of_all_tenants() {
        let fx = Fixture::new();
        for _ in 0..3 {
            fx.store
                .insert_shift(crate::db::store::NewShift {
                    tenant_id: Uuid::new_v4(),
                    driver_id: Uuid::new_v4(),
                    truck_id: Uuid::new_v4(),
                    started_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let report = fx.service().run_evaluation_cycle(Utc::now()).await;
        assert_eq!(report.shifts_checked, 3);
    }
}
