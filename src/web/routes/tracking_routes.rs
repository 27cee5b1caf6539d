use axum::{
    Json, Router,
    extract::{Extension, State},
    routing::{get, post},
};
use std::sync::Arc;
use tracing::debug;

use crate::db::store::{Directory, ShiftStore};
use crate::web::models::Identity;
use crate::web::models::tracking_models::{
    ActiveShiftResponse, ActiveShiftSummary, EndShiftRequest, EndShiftResponse,
    PingBatchRequest, PingBatchResponse, StartShiftRequest, StartShiftResponse,
};
use crate::web::{AppError, AppState};

// --- Route Handlers ---

async fn start_shift_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<StartShiftRequest>,
) -> Result<Json<StartShiftResponse>, AppError> {
    // Trucks of another tenant are reported exactly like missing ones.
    app_state
        .directory
        .find_vehicle(identity.tenant_id, payload.truck_id)
        .await?
        .ok_or_else(|| AppError::NotFound("truck not found".to_string()))?;

    let shift = app_state
        .shifts
        .start(identity.tenant_id, identity.user_id, payload.truck_id)
        .await?;
    Ok(Json(StartShiftResponse {
        shift_id: shift.id,
        truck_id: shift.truck_id,
        started_at: shift.started_at,
    }))
}

async fn end_shift_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<EndShiftRequest>,
) -> Result<Json<EndShiftResponse>, AppError> {
    let shift = app_state
        .shifts
        .end(identity.tenant_id, identity.user_id, payload.shift_id)
        .await?;
    Ok(Json(EndShiftResponse::from(shift)))
}

async fn ingest_pings_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<PingBatchRequest>,
) -> Result<Json<PingBatchResponse>, AppError> {
    let outcome = app_state
        .ingestion
        .ingest(identity.tenant_id, identity.user_id, payload.pings)
        .await?;
    Ok(Json(PingBatchResponse {
        received: outcome.accepted,
    }))
}

async fn get_active_shift_handler(
    Extension(identity): Extension<Identity>,
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ActiveShiftResponse>, AppError> {
    let active_shift = app_state
        .store
        .find_active_shift_for_driver(identity.tenant_id, identity.user_id)
        .await?
        .map(|shift| ActiveShiftSummary {
            shift_id: shift.id,
            truck_id: shift.truck_id,
            started_at: shift.started_at,
        });
    if active_shift.is_none() {
        debug!(driver_id = %identity.user_id, "No active shift for driver.");
    }
    Ok(Json(ActiveShiftResponse { active_shift }))
}

// --- Router ---

pub fn create_driver_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shifts/start", post(start_shift_handler))
        .route("/shifts/end", post(end_shift_handler))
        .route("/tracking/ping", post(ingest_pings_handler))
        .route("/driver/active-shift", get(get_active_shift_handler))
}
