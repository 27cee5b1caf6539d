use std::time::Duration;
use thiserror::Error;

use crate::db::store::StoreError;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Too many ping batches, retry in {}s", retry_after.as_secs().max(1))]
    RateLimited { retry_after: Duration },
    #[error("No active shift")]
    NoActiveShift,
    #[error("Driver already has an active shift")]
    AlreadyActive,
    #[error("Truck is already in use by another driver")]
    TruckInUse,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TrackingError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            TrackingError::RateLimited { .. } => "rate_limited",
            TrackingError::NoActiveShift => "no_active_shift",
            TrackingError::AlreadyActive => "already_active",
            TrackingError::TruckInUse => "truck_in_use",
            TrackingError::NotFound(_) => "not_found",
            TrackingError::Validation(_) => "validation",
            TrackingError::Store(_) => "store",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackingError::RateLimited { .. })
    }
}
