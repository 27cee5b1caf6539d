use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::entities::alert_config::{
    self, DEFAULT_MAX_STOP_DURATION_MINUTES, DEFAULT_OFFLINE_THRESHOLD_MINUTES,
};
use crate::db::store::{
    AlertConfigInput, AlertConfigStore, AlertFilter, AlertStore, AlertTransition, Directory,
    PingStore, RecentAlertQuery, ZoneInput, ZoneStore,
};
use crate::web::models::Identity;
use crate::web::models::tracking_models::{
    ActiveShiftView, ActiveShiftsResponse, AlertConfigResponse, AlertListResponse,
    AlertResponse, ListAlertsQuery, LivePosition, LivePositionsResponse, ResolveAlertRequest,
    ZoneResponse, ZonesResponse, live_status,
};
use crate::web::{AppError, AppState};

/// How far back the live map and its red status look.
const LIVE_WINDOW_MINUTES: i64 = 30;
const DEFAULT_ALERT_PAGE_SIZE: u64 = 50;
const MAX_ALERT_PAGE_SIZE: u64 = 200;

/// Display name and plate for a driver/truck pair. Lookup failures leave
/// the fields empty.
async fn display_labels(
    directory: &dyn Directory,
    tenant_id: Uuid,
    driver_id: Uuid,
    truck_id: Uuid,
) -> (String, String) {
    let driver_name = match directory.find_driver(tenant_id, driver_id).await {
        Ok(driver) => driver.map(|d| d.display_name()).unwrap_or_default(),
        Err(e) => {
            warn!(%driver_id, error = %e, "Driver lookup failed.");
            String::new()
        }
    };
    let truck_plate = match directory.find_vehicle(tenant_id, truck_id).await {
        Ok(vehicle) => vehicle.and_then(|v| v.license_plate).unwrap_or_default(),
        Err(e) => {
            warn!(%truck_id, error = %e, "Vehicle lookup failed.");
            String::new()
        }
    };
    (driver_name, truck_plate)
}

async fn effective_alert_config(
    app_state: &AppState,
    tenant_id: Uuid,
) -> Result<alert_config::Model, AppError> {
    Ok(app_state
        .store
        .find_alert_config(tenant_id)
        .await?
        .unwrap_or_else(|| alert_config::Model::defaults_for(tenant_id)))
}

// --- Live tracking ---

async fn live_positions_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<LivePositionsResponse>, AppError> {
    let tenant_id = identity.tenant_id;
    let now = Utc::now();
    let since = now - Duration::minutes(LIVE_WINDOW_MINUTES);
    let config = effective_alert_config(&app_state, tenant_id).await?;
    let offline_threshold = Duration::minutes(i64::from(config.offline_threshold_minutes));

    let pings = app_state
        .store
        .find_latest_pings_for_tenant(tenant_id, since)
        .await?;
    let mut positions = Vec::with_capacity(pings.len());
    for ping in pings {
        let has_recent_alert = app_state
            .store
            .has_recent_alert(RecentAlertQuery {
                tenant_id,
                driver_id: ping.driver_id,
                alert_type: None,
                since,
                open_only: false,
            })
            .await?;
        let (driver_name, truck_plate) = display_labels(
            app_state.directory.as_ref(),
            tenant_id,
            ping.driver_id,
            ping.truck_id,
        )
        .await;
        positions.push(LivePosition {
            status: live_status(&ping, now, offline_threshold, has_recent_alert),
            driver_id: ping.driver_id,
            driver_name,
            truck_id: ping.truck_id,
            truck_plate,
            shift_id: ping.shift_id,
            latitude: ping.latitude,
            longitude: ping.longitude,
            speed_kmh: ping.speed_kmh,
            heading: ping.heading,
            battery_level: ping.battery_level,
            is_moving: ping.is_moving,
            recorded_at: ping.recorded_at,
        });
    }
    Ok(Json(LivePositionsResponse { positions }))
}

async fn active_shifts_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ActiveShiftsResponse>, AppError> {
    let active = app_state
        .shifts
        .get_active_for_tenant(identity.tenant_id)
        .await?;
    let mut shifts = Vec::with_capacity(active.len());
    for shift in active {
        let (driver_name, truck_plate) = display_labels(
            app_state.directory.as_ref(),
            shift.tenant_id,
            shift.driver_id,
            shift.truck_id,
        )
        .await;
        shifts.push(ActiveShiftView {
            shift_id: shift.id,
            driver_id: shift.driver_id,
            driver_name,
            truck_id: shift.truck_id,
            truck_plate,
            started_at: shift.started_at,
            total_km: shift.total_km,
        });
    }
    Ok(Json(ActiveShiftsResponse { shifts }))
}

// --- Alerts ---

async fn list_alerts_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<ListAlertsQuery>,
) -> Result<Json<AlertListResponse>, AppError> {
    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_ALERT_PAGE_SIZE)
        .min(MAX_ALERT_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);
    let page = app_state
        .store
        .list_alerts(
            identity.tenant_id,
            AlertFilter {
                status: query.status,
                limit,
                offset,
            },
        )
        .await?;
    Ok(Json(AlertListResponse {
        alerts: page.alerts,
        total: page.total,
        limit,
        offset,
    }))
}

async fn get_alert_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<AlertResponse>, AppError> {
    let alert = app_state
        .store
        .find_alert(identity.tenant_id, alert_id)
        .await?
        .ok_or_else(|| AppError::NotFound("alert not found".to_string()))?;
    Ok(Json(AlertResponse { alert }))
}

async fn apply_transition(
    app_state: &AppState,
    identity: &Identity,
    alert_id: Uuid,
    transition: AlertTransition,
) -> Result<Json<serde_json::Value>, AppError> {
    let target = transition.target_status();
    let updated = app_state
        .store
        .transition_alert(identity.tenant_id, alert_id, transition, Utc::now())
        .await?;
    if updated.is_some() {
        info!(%alert_id, manager_id = %identity.user_id, status = %target, "Alert status changed.");
        return Ok(Json(serde_json::json!({ "status": target })));
    }
    match app_state.store.find_alert(identity.tenant_id, alert_id).await? {
        Some(current) => Err(AppError::Conflict(format!(
            "alert is {} and cannot become {}",
            current.status, target
        ))),
        None => Err(AppError::NotFound("alert not found".to_string())),
    }
}

async fn acknowledge_alert_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    apply_transition(&app_state, &identity, alert_id, AlertTransition::Acknowledge).await
}

async fn resolve_alert_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Path(alert_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    // The body is optional; an empty one resolves without notes.
    let request: ResolveAlertRequest = if body.is_empty() {
        ResolveAlertRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::InvalidInput(format!("invalid request body: {e}")))?
    };
    let notes = request.notes.filter(|n| !n.trim().is_empty());
    apply_transition(&app_state, &identity, alert_id, AlertTransition::Resolve { notes }).await
}

async fn false_alarm_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    apply_transition(&app_state, &identity, alert_id, AlertTransition::FalseAlarm).await
}

async fn get_alert_config_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<AlertConfigResponse>, AppError> {
    let config = effective_alert_config(&app_state, identity.tenant_id).await?;
    Ok(Json(AlertConfigResponse { config }))
}

async fn update_alert_config_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Json(mut payload): Json<AlertConfigInput>,
) -> Result<Json<AlertConfigResponse>, AppError> {
    if payload.max_stop_duration_minutes <= 0 {
        payload.max_stop_duration_minutes = DEFAULT_MAX_STOP_DURATION_MINUTES;
    }
    if payload.offline_threshold_minutes <= 0 {
        payload.offline_threshold_minutes = DEFAULT_OFFLINE_THRESHOLD_MINUTES;
    }
    let config = app_state
        .store
        .upsert_alert_config(identity.tenant_id, payload)
        .await?;
    info!(tenant_id = %identity.tenant_id, "Alert config updated.");
    Ok(Json(AlertConfigResponse { config }))
}

// --- Zones ---

fn validate_zone(input: &ZoneInput) -> Result<(), AppError> {
    if input.label.trim().is_empty() {
        return Err(AppError::InvalidInput("label is required".to_string()));
    }
    if !(input.radius_meters > 0.0) {
        return Err(AppError::InvalidInput("radius_meters must be positive".to_string()));
    }
    if !(-90.0..=90.0).contains(&input.latitude) || !(-180.0..=180.0).contains(&input.longitude) {
        return Err(AppError::InvalidInput("coordinates out of range".to_string()));
    }
    Ok(())
}

async fn list_zones_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ZonesResponse>, AppError> {
    let zones = app_state
        .store
        .find_zones_for_tenant(identity.tenant_id)
        .await?;
    Ok(Json(ZonesResponse { zones }))
}

async fn create_zone_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<ZoneInput>,
) -> Result<(StatusCode, Json<ZoneResponse>), AppError> {
    validate_zone(&payload)?;
    let zone = app_state
        .store
        .insert_zone(identity.tenant_id, payload)
        .await?;
    info!(tenant_id = %identity.tenant_id, zone_id = %zone.id, "Approved zone created.");
    Ok((StatusCode::CREATED, Json(ZoneResponse { zone })))
}

async fn update_zone_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Path(zone_id): Path<Uuid>,
    Json(payload): Json<ZoneInput>,
) -> Result<Json<ZoneResponse>, AppError> {
    validate_zone(&payload)?;
    let zone = app_state
        .store
        .update_zone(identity.tenant_id, zone_id, payload)
        .await?
        .ok_or_else(|| AppError::NotFound("zone not found".to_string()))?;
    Ok(Json(ZoneResponse { zone }))
}

async fn delete_zone_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Path(zone_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    if app_state
        .store
        .delete_zone(identity.tenant_id, zone_id)
        .await?
    {
        Ok(Json(serde_json::json!({ "status": "deleted" })))
    } else {
        Err(AppError::NotFound("zone not found".to_string()))
    }
}

// --- Router ---

pub fn create_manager_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking/live", get(live_positions_handler))
        .route("/shifts/active", get(active_shifts_handler))
        .route("/alerts", get(list_alerts_handler))
        .route(
            "/alerts/config",
            get(get_alert_config_handler).put(update_alert_config_handler),
        )
        .route("/alerts/{alert_id}", get(get_alert_handler))
        .route("/alerts/{alert_id}/acknowledge", put(acknowledge_alert_handler))
        .route("/alerts/{alert_id}/resolve", put(resolve_alert_handler))
        .route("/alerts/{alert_id}/false-alarm", put(false_alarm_handler))
        .route("/zones", get(list_zones_handler).post(create_zone_handler))
        .route(
            "/zones/{zone_id}",
            put(update_zone_handler).delete(delete_zone_handler),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::ZoneType;

    fn zone(label: &str, radius_meters: f64, latitude: f64) -> ZoneInput {
        ZoneInput {
            label: label.to_string(),
            latitude,
            longitude: 10.0,
            radius_meters,
            zone_type: ZoneType::Warehouse,
        }
    }

    #[test]
    fn test_zone_validation() {
        assert!(validate_zone(&zone("Depot", 100.0, 45.0)).is_ok());
        assert!(validate_zone(&zone("  ", 100.0, 45.0)).is_err());
        assert!(validate_zone(&zone("Depot", 0.0, 45.0)).is_err());
        assert!(validate_zone(&zone("Depot", f64::NAN, 45.0)).is_err());
        assert!(validate_zone(&zone("Depot", 100.0, 91.0)).is_err());
    }
}
