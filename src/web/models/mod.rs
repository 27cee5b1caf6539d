use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod tracking_models;
pub mod websocket_models;

pub const DRIVER_ROLE: &str = "driver";

/// JWT claims. Token issuance lives outside this service; only the fields
/// identifying the caller are read.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: String,
    pub exp: usize, // Expiration time (timestamp)
}

/// Caller identity, passed to handlers as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: String,
}

impl Identity {
    pub fn is_driver(&self) -> bool {
        self.role == DRIVER_ROLE
    }
}
