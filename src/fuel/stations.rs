use std::cmp::Ordering;

use tracing::{debug, trace, warn};

use crate::config::constant::{
    FALLBACK_PROBE_FRACTIONS, STATION_BASE_RADIUS_METERS, STATION_CATEGORY, STATION_RADIUS_FACTORS,
};
use crate::domain::types::{LatLng, TravelMode, Waypoint};
use crate::services::{resolve, PlaceCandidate};

use super::geometry::{cumulative_miles, point_at_miles};
use super::tracker::FuelServices;

/// Best-rated station near `point`, widening the search radius step by step.
/// A failed lookup counts as an empty ring.
pub async fn find_nearby_station(
    services: &FuelServices<'_>,
    point: LatLng,
    base_radius_meters: f64,
) -> Option<PlaceCandidate> {
    for factor in STATION_RADIUS_FACTORS {
        let radius = base_radius_meters * factor;
        match services.places.nearby(point, radius, STATION_CATEGORY).await {
            Ok(candidates) if !candidates.is_empty() => {
                trace!("{} stations within {:.0} m of {}", candidates.len(), radius, point);
                return rank(candidates).into_iter().next();
            }
            Ok(_) => {}
            Err(e) => warn!("Station search at {} ({:.0} m) failed: {}", point, radius, e),
        }
    }
    None
}

/// Highest rating first, then most ratings. Missing values count as zero and
/// ties keep the service's order.
pub fn rank(mut candidates: Vec<PlaceCandidate>) -> Vec<PlaceCandidate> {
    candidates.sort_by(|a, b| {
        let rating = b.rating.unwrap_or(0.0).total_cmp(&a.rating.unwrap_or(0.0));
        match rating {
            Ordering::Equal => b.rating_count.unwrap_or(0).cmp(&a.rating_count.unwrap_or(0)),
            other => other,
        }
    });
    candidates
}

/// A refuel station between `origin` and `destination`.
///
/// Looks first near the point `preferred_miles` along the real route, then
/// along the straight line between the two ends, and finally with a doubled
/// radius at the midpoint.
pub async fn best_station_between(
    services: &FuelServices<'_>,
    origin: &Waypoint,
    destination: &Waypoint,
    mode: TravelMode,
    preferred_miles: Option<f64>,
) -> Option<LatLng> {
    if let Some(target) = preferred_miles {
        match services.geometry.route_path(origin, destination, mode).await {
            Ok(Some(path)) if path.len() >= 2 => {
                let cum = cumulative_miles(&path);
                if let Some(probe) = point_at_miles(&path, &cum, target) {
                    debug!("Probing for a station {:.1} mi along the route at {}", target, probe);
                    if let Some(station) =
                        find_nearby_station(services, probe, STATION_BASE_RADIUS_METERS).await
                    {
                        return Some(station.location);
                    }
                }
            }
            Ok(_) => debug!("No route geometry for {} -> {}", origin, destination),
            Err(e) => warn!("Route geometry {} -> {} failed: {}", origin, destination, e),
        }
    }

    let (a, b) = match (
        resolve(services.geocoder, origin).await,
        resolve(services.geocoder, destination).await,
    ) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Cannot place straight-line probes: {}", e);
            return None;
        }
    };

    for t in FALLBACK_PROBE_FRACTIONS {
        if let Some(station) =
            find_nearby_station(services, a.lerp(&b, t), STATION_BASE_RADIUS_METERS).await
        {
            return Some(station.location);
        }
    }
    find_nearby_station(services, a.lerp(&b, 0.5), 2.0 * STATION_BASE_RADIUS_METERS)
        .await
        .map(|s| s.location)
}
