//! Driver-facing tracking core: shifts, ping ingestion and zone matching.

pub mod error;
pub mod geofence;
pub mod ingestion;
pub mod rate_limiter;
pub mod shift_manager;

pub use error::TrackingError;
