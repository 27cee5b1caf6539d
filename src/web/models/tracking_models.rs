use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::entities::{alert, alert_config, approved_zone, gps_ping, shift};
use crate::db::enums::AlertStatus;
use crate::tracking::ingestion::RawPing;

// --- Driver API ---

#[derive(Debug, Deserialize)]
pub struct StartShiftRequest {
    pub truck_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartShiftResponse {
    pub shift_id: Uuid,
    pub truck_id: Uuid,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct EndShiftRequest {
    pub shift_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndShiftResponse {
    pub shift_id: Uuid,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_km: f64,
    pub total_duration_minutes: f64,
}

impl From<shift::Model> for EndShiftResponse {
    fn from(shift: shift::Model) -> Self {
        let total_duration_minutes = shift
            .ended_at
            .map(|ended| (ended - shift.started_at).num_milliseconds() as f64 / 60_000.0)
            .unwrap_or_default();
        Self {
            shift_id: shift.id,
            ended_at: shift.ended_at,
            total_km: shift.total_km,
            total_duration_minutes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PingBatchRequest {
    pub pings: Vec<RawPing>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingBatchResponse {
    pub received: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveShiftSummary {
    pub shift_id: Uuid,
    pub truck_id: Uuid,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveShiftResponse {
    pub active_shift: Option<ActiveShiftSummary>,
}

// --- Manager API ---

/// Colour shown on the live map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    /// Silent for longer than the offline threshold.
    Gray,
    /// Reporting but stationary.
    Yellow,
    Green,
    /// Has an alert in the recent window.
    Red,
}

pub fn live_status(
    ping: &gps_ping::Model,
    now: DateTime<Utc>,
    offline_threshold: Duration,
    has_recent_alert: bool,
) -> LiveStatus {
    if has_recent_alert {
        LiveStatus::Red
    } else if now - ping.recorded_at > offline_threshold {
        LiveStatus::Gray
    } else if !ping.is_moving {
        LiveStatus::Yellow
    } else {
        LiveStatus::Green
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LivePosition {
    pub driver_id: Uuid,
    pub driver_name: String,
    pub truck_id: Uuid,
    pub truck_plate: String,
    pub shift_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
    pub heading: i32,
    pub battery_level: i32,
    pub is_moving: bool,
    pub recorded_at: DateTime<Utc>,
    pub status: LiveStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LivePositionsResponse {
    pub positions: Vec<LivePosition>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveShiftView {
    pub shift_id: Uuid,
    pub driver_id: Uuid,
    pub driver_name: String,
    pub truck_id: Uuid,
    pub truck_plate: String,
    pub started_at: DateTime<Utc>,
    pub total_km: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActiveShiftsResponse {
    pub shifts: Vec<ActiveShiftView>,
}

#[derive(Debug, Deserialize)]
pub struct ListAlertsQuery {
    pub status: Option<AlertStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertListResponse {
    pub alerts: Vec<alert::Model>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertResponse {
    pub alert: alert::Model,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveAlertRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertConfigResponse {
    pub config: alert_config::Model,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ZoneResponse {
    pub zone: approved_zone::Model,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ZonesResponse {
    pub zones: Vec<approved_zone::Model>,
}
