//! Narrow interfaces to the external services the fuel pass relies on.
//!
//! Each is implemented by the HTTP clients in [`crate::api`]; tests plug in
//! scripted versions.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::types::{LatLng, TravelMode, Waypoint};
use crate::error::ProviderError;

/// A place returned by a nearby search.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceCandidate {
    pub location: LatLng,
    pub name: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<u64>,
}

impl PlaceCandidate {
    pub fn at(location: LatLng) -> Self {
        Self {
            location,
            name: None,
            rating: None,
            rating_count: None,
        }
    }
}

#[async_trait]
pub trait PointOfInterestLocator: Send + Sync {
    /// Places of `category` within `radius_meters` of `location`. May be empty.
    async fn nearby(
        &self,
        location: LatLng,
        radius_meters: f64,
        category: &str,
    ) -> Result<Vec<PlaceCandidate>, ProviderError>;
}

#[async_trait]
pub trait LegDistanceProvider: Send + Sync {
    /// Travel distance of a single leg in miles.
    async fn leg_miles(
        &self,
        origin: &Waypoint,
        destination: &Waypoint,
        mode: TravelMode,
    ) -> Result<f64, ProviderError>;
}

#[async_trait]
pub trait RouteGeometryProvider: Send + Sync {
    /// The polyline of the route between two waypoints, if the service has one.
    async fn route_path(
        &self,
        origin: &Waypoint,
        destination: &Waypoint,
        mode: TravelMode,
    ) -> Result<Option<Vec<LatLng>>, ProviderError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<LatLng, ProviderError>;
}

/// Coordinates of `waypoint`, geocoding addresses on demand.
pub async fn resolve(geocoder: &dyn Geocoder, waypoint: &Waypoint) -> Result<LatLng, ProviderError> {
    match waypoint {
        Waypoint::Coord(c) => Ok(*c),
        Waypoint::Address(address) => {
            debug!("Geocoding '{}'", address);
            geocoder.geocode(address).await
        }
    }
}

/// A geocoder that only accepts coordinate waypoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeocoder;

#[async_trait]
impl Geocoder for NoGeocoder {
    async fn geocode(&self, address: &str) -> Result<LatLng, ProviderError> {
        Err(ProviderError::UnresolvedWaypoint(address.to_string()))
    }
}
