use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::entities::alert;

/// Position update pushed to dashboards after a batch is stored.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrackingUpdate {
    pub driver_id: Uuid,
    pub driver_name: String,
    pub truck_id: Uuid,
    pub truck_plate: String,
    pub shift_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub speed: f64,
    pub heading: i32,
    pub battery: i32,
    pub is_moving: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum WsMessage {
    Tracking(TrackingUpdate),
    Alert(alert::Model),
}
