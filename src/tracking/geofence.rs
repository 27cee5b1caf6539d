use std::sync::Arc;
use uuid::Uuid;

use crate::db::entities::approved_zone;
use crate::db::store::ZoneStore;
use crate::geo;
use crate::tracking::TrackingError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneMatch {
    pub inside: bool,
    pub nearest_zone_id: Option<Uuid>,
    pub nearest_distance_meters: Option<f64>,
}

/// Scans zones in order, keeping the closest one seen. Stops at the first
/// zone that contains the point, so when `inside` is true the nearest
/// fields describe the closest zone among those scanned so far, not
/// necessarily the containing one.
pub fn match_zones(zones: &[approved_zone::Model], lat: f64, lon: f64) -> ZoneMatch {
    let mut result = ZoneMatch {
        inside: false,
        nearest_zone_id: None,
        nearest_distance_meters: None,
    };
    for zone in zones {
        let distance = geo::distance_meters(lat, lon, zone.latitude, zone.longitude);
        if result.nearest_distance_meters.is_none_or(|nearest| distance < nearest) {
            result.nearest_zone_id = Some(zone.id);
            result.nearest_distance_meters = Some(distance);
        }
        if distance <= zone.radius_meters {
            result.inside = true;
            break;
        }
    }
    result
}

pub struct GeofenceMatcher {
    zones: Arc<dyn ZoneStore>,
}

impl GeofenceMatcher {
    pub fn new(zones: Arc<dyn ZoneStore>) -> Self {
        Self { zones }
    }

    pub async fn match_point(
        &self,
        tenant_id: Uuid,
        lat: f64,
        lon: f64,
    ) -> Result<ZoneMatch, TrackingError> {
        let zones = self.zones.find_zones_for_tenant(tenant_id).await?;
        Ok(match_zones(&zones, lat, lon))
    }
}
