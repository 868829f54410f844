use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, trace, warn};

use crate::config::constant::METERS_PER_MILE;
use crate::config::Settings;
use crate::domain::types::{LatLng, TravelMode, Waypoint};
use crate::error::ProviderError;
use crate::services::{resolve, Geocoder, LegDistanceProvider, NoGeocoder, RouteGeometryProvider};

/// Public OSRM servers reject URLs much longer than this.
const MAX_URL_LEN: usize = 8000;

/// OSRM HTTP client. Addresses are resolved through the attached geocoder;
/// without one only coordinate waypoints work.
#[derive(Clone)]
pub struct OsrmClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) geocoder: Arc<dyn Geocoder>,
}

impl std::fmt::Debug for OsrmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsrmClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OsrmClient {
    pub fn new(base_url: &str, settings: &Settings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            geocoder: Arc::new(NoGeocoder),
        })
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = geocoder;
        self
    }

    /// `lon,lat;lon,lat;...` for the given waypoints.
    pub(crate) async fn coordinate_path(&self, waypoints: &[Waypoint]) -> Result<String, ProviderError> {
        let mut parts = Vec::with_capacity(waypoints.len());
        for waypoint in waypoints {
            let c = resolve(self.geocoder.as_ref(), waypoint).await?;
            // OSRM wants longitude first
            parts.push(format!("{},{}", c.lng, c.lat));
        }
        Ok(parts.join(";"))
    }

    pub(crate) fn url(&self, service: &str, mode: TravelMode, coords: &str, query: &str) -> Result<String, ProviderError> {
        let url = format!(
            "{}/{}/v1/{}/{}?{}",
            self.base_url,
            service,
            profile(mode)?,
            coords,
            query
        );
        if url.len() > MAX_URL_LEN {
            error!("OSRM {} URL is {} chars long", service, url.len());
            return Err(ProviderError::RequestTooLarge(url.len()));
        }
        Ok(url)
    }

    pub(crate) async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ProviderError> {
        trace!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        // OSRM reports NoRoute and friends with a 400 and a JSON body.
        if !status.is_success() && status != reqwest::StatusCode::BAD_REQUEST {
            error!("OSRM returned HTTP {}", status);
            return Err(ProviderError::Status {
                service: "osrm",
                status: status.to_string(),
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// Durations (s) and distances (m) for every ordered pair.
    pub(crate) async fn table(
        &self,
        waypoints: &[Waypoint],
        mode: TravelMode,
    ) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>), ProviderError> {
        let coords = self.coordinate_path(waypoints).await?;
        let url = self.url("table", mode, &coords, "annotations=duration,distance")?;
        let response: TableResponse = self.get_json(&url).await?;
        check_code(&response.code, response.message.as_deref())?;

        let durations = fill_nulls(response.durations.unwrap_or_default());
        let distances = fill_nulls(response.distances.unwrap_or_default());
        debug!("OSRM table: {} rows", durations.len());
        Ok((durations, distances))
    }

    /// `None` when OSRM finds no route between the points.
    pub(crate) async fn route(
        &self,
        waypoints: &[Waypoint],
        mode: TravelMode,
        query: &str,
    ) -> Result<Option<OsrmRoute>, ProviderError> {
        let coords = self.coordinate_path(waypoints).await?;
        let url = self.url("route", mode, &coords, query)?;
        let response: RouteResponse = self.get_json(&url).await?;
        if response.code == "NoRoute" {
            return Ok(None);
        }
        check_code(&response.code, response.message.as_deref())?;
        Ok(response.routes.into_iter().next())
    }
}

/// OSRM profile for a travel mode. OSRM has no transit data.
pub fn profile(mode: TravelMode) -> Result<&'static str, ProviderError> {
    match mode {
        TravelMode::Driving => Ok("driving"),
        TravelMode::Walking => Ok("foot"),
        TravelMode::Bicycling => Ok("bike"),
        TravelMode::Transit => Err(ProviderError::UnsupportedMode {
            provider: "osrm",
            mode: mode.to_string(),
        }),
    }
}

fn check_code(code: &str, message: Option<&str>) -> Result<(), ProviderError> {
    if code == "Ok" {
        Ok(())
    } else {
        error!("OSRM error {}: {}", code, message.unwrap_or(""));
        Err(ProviderError::Status {
            service: "osrm",
            status: code.to_string(),
        })
    }
}

fn fill_nulls(rows: Vec<Vec<Option<f64>>>) -> Vec<Vec<f64>> {
    rows.into_iter()
        .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::INFINITY)).collect())
        .collect()
}

#[async_trait]
impl Geocoder for OsrmClient {
    async fn geocode(&self, address: &str) -> Result<LatLng, ProviderError> {
        self.geocoder.geocode(address).await
    }
}

#[async_trait]
impl LegDistanceProvider for OsrmClient {
    async fn leg_miles(
        &self,
        origin: &Waypoint,
        destination: &Waypoint,
        mode: TravelMode,
    ) -> Result<f64, ProviderError> {
        let pair = [origin.clone(), destination.clone()];
        match self.route(&pair, mode, "overview=false").await? {
            Some(route) => Ok(route.distance / METERS_PER_MILE),
            None => {
                warn!("OSRM has no route {} -> {}", origin, destination);
                Err(ProviderError::MalformedResponse(format!(
                    "no route for {origin} -> {destination}"
                )))
            }
        }
    }
}

#[async_trait]
impl RouteGeometryProvider for OsrmClient {
    async fn route_path(
        &self,
        origin: &Waypoint,
        destination: &Waypoint,
        mode: TravelMode,
    ) -> Result<Option<Vec<LatLng>>, ProviderError> {
        let pair = [origin.clone(), destination.clone()];
        let route = self
            .route(&pair, mode, "overview=full&geometries=geojson")
            .await?;
        Ok(route
            .and_then(|r| r.geometry)
            .map(|g| g.into_path())
            .filter(|p| p.len() >= 2))
    }
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    code: String,
    message: Option<String>,
    durations: Option<Vec<Vec<Option<f64>>>>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RouteResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmRoute {
    pub(crate) distance: f64,
    #[serde(default)]
    pub(crate) legs: Vec<OsrmLeg>,
    geometry: Option<GeoJsonLine>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsrmLeg {
    #[serde(default)]
    pub(crate) steps: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GeoJsonLine {
    coordinates: Vec<[f64; 2]>,
}

impl GeoJsonLine {
    fn into_path(self) -> Vec<LatLng> {
        self.coordinates
            .into_iter()
            .map(|[lng, lat]| LatLng::new(lat, lng))
            .collect()
    }
}
