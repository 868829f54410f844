use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, trace, warn};

use crate::config::constant::METERS_PER_MILE;
use crate::config::Settings;
use crate::domain::types::{LatLng, MatrixRequest, TravelMode, Waypoint};
use crate::error::ProviderError;
use crate::services::{
    Geocoder, LegDistanceProvider, PlaceCandidate, PointOfInterestLocator, RouteGeometryProvider,
};

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// Google Maps web-service client. Build one per caller and pass it down.
#[derive(Debug, Clone)]
pub struct GoogleMapsClient {
    pub(crate) client: Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
}

impl GoogleMapsClient {
    pub fn new(api_key: &str, settings: &Settings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub(crate) async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}/{}/json", self.base_url, endpoint);
        trace!("GET {} {:?}", url, params);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!("Google {} returned HTTP {}", endpoint, status);
            return Err(ProviderError::Status {
                service: "google",
                status: status.to_string(),
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// Durations (s) and distances (m) for one block of origins x destinations.
    pub(crate) async fn distance_matrix_block(
        &self,
        origins: &[Waypoint],
        destinations: &[Waypoint],
        request: &MatrixRequest,
    ) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>), ProviderError> {
        let mut params = vec![
            ("origins", join_waypoints(origins)),
            ("destinations", join_waypoints(destinations)),
            ("mode", request.mode.as_str().to_string()),
            ("units", "imperial".to_string()),
        ];
        if request.mode == TravelMode::Driving {
            if let Some(departure) = request.departure_time {
                params.push(("departure_time", departure.timestamp().to_string()));
            }
        }
        let avoid = avoid_param(request.avoid_highways, request.avoid_tolls);
        if !avoid.is_empty() {
            params.push(("avoid", avoid));
        }

        let response: DistanceMatrixResponse = self.get_json("distancematrix", &params).await?;
        check_status("distancematrix", &response.status)?;
        if response.rows.len() != origins.len() {
            return Err(ProviderError::MalformedResponse(format!(
                "distance matrix returned {} rows for {} origins",
                response.rows.len(),
                origins.len()
            )));
        }

        let mut times = Vec::with_capacity(origins.len());
        let mut distances = Vec::with_capacity(origins.len());
        for row in response.rows {
            let mut time_row = Vec::with_capacity(destinations.len());
            let mut dist_row = Vec::with_capacity(destinations.len());
            for element in row.elements {
                match (element.status.as_str(), element.duration, element.distance) {
                    ("OK", Some(duration), Some(distance)) => {
                        time_row.push(duration.value);
                        dist_row.push(distance.value);
                    }
                    (status, _, _) => {
                        trace!("Element status {} treated as unreachable", status);
                        time_row.push(f64::INFINITY);
                        dist_row.push(f64::INFINITY);
                    }
                }
            }
            times.push(time_row);
            distances.push(dist_row);
        }
        Ok((times, distances))
    }

    /// `None` when Google has no route between the two points.
    pub(crate) async fn directions(
        &self,
        origin: &Waypoint,
        destination: &Waypoint,
        mode: TravelMode,
    ) -> Result<Option<DirectionsRoute>, ProviderError> {
        let params = [
            ("origin", origin.to_string()),
            ("destination", destination.to_string()),
            ("mode", mode.as_str().to_string()),
        ];
        let response: DirectionsResponse = self.get_json("directions", &params).await?;
        match response.status.as_str() {
            "OK" => Ok(response.routes.into_iter().next()),
            "ZERO_RESULTS" | "NOT_FOUND" => Ok(None),
            other => {
                error!("Directions {} -> {} failed: {}", origin, destination, other);
                Err(ProviderError::Status {
                    service: "google directions",
                    status: other.to_string(),
                })
            }
        }
    }
}

fn join_waypoints(waypoints: &[Waypoint]) -> String {
    waypoints
        .iter()
        .map(|w| w.to_string())
        .collect::<Vec<String>>()
        .join("|")
}

fn avoid_param(highways: bool, tolls: bool) -> String {
    let mut avoid = Vec::new();
    if highways {
        avoid.push("highways");
    }
    if tolls {
        avoid.push("tolls");
    }
    avoid.join("|")
}

fn check_status(service: &'static str, status: &str) -> Result<(), ProviderError> {
    if status == "OK" {
        Ok(())
    } else {
        error!("Google {} returned status {}", service, status);
        Err(ProviderError::Status {
            service,
            status: status.to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for GoogleMapsClient {
    async fn geocode(&self, address: &str) -> Result<LatLng, ProviderError> {
        let response: GeocodeResponse = self
            .get_json("geocode", &[("address", address.to_string())])
            .await?;
        match response.status.as_str() {
            "OK" => response
                .results
                .into_iter()
                .next()
                .map(|r| r.geometry.location.into())
                .ok_or_else(|| ProviderError::UnresolvedWaypoint(address.to_string())),
            "ZERO_RESULTS" => Err(ProviderError::UnresolvedWaypoint(address.to_string())),
            other => Err(ProviderError::Status {
                service: "google geocode",
                status: other.to_string(),
            }),
        }
    }
}

#[async_trait]
impl PointOfInterestLocator for GoogleMapsClient {
    async fn nearby(
        &self,
        location: LatLng,
        radius_meters: f64,
        category: &str,
    ) -> Result<Vec<PlaceCandidate>, ProviderError> {
        let params = [
            ("location", location.to_string()),
            ("radius", format!("{}", radius_meters.round() as i64)),
            ("type", category.to_string()),
        ];
        let response: PlacesResponse = self.get_json("place/nearbysearch", &params).await?;
        match response.status.as_str() {
            "OK" => Ok(response
                .results
                .into_iter()
                .map(|p| PlaceCandidate {
                    location: p.geometry.location.into(),
                    name: p.name,
                    rating: p.rating,
                    rating_count: p.user_ratings_total,
                })
                .collect()),
            "ZERO_RESULTS" => Ok(vec![]),
            other => Err(ProviderError::Status {
                service: "google places",
                status: other.to_string(),
            }),
        }
    }
}

#[async_trait]
impl LegDistanceProvider for GoogleMapsClient {
    async fn leg_miles(
        &self,
        origin: &Waypoint,
        destination: &Waypoint,
        mode: TravelMode,
    ) -> Result<f64, ProviderError> {
        let request = MatrixRequest::new(vec![], mode);
        let (_, distances) = self
            .distance_matrix_block(
                std::slice::from_ref(origin),
                std::slice::from_ref(destination),
                &request,
            )
            .await?;
        let meters = distances
            .first()
            .and_then(|row| row.first())
            .copied()
            .unwrap_or(f64::INFINITY);
        if !meters.is_finite() {
            warn!("No driving distance between {} and {}", origin, destination);
            return Err(ProviderError::MalformedResponse(format!(
                "no distance element for {origin} -> {destination}"
            )));
        }
        Ok(meters / METERS_PER_MILE)
    }
}

#[async_trait]
impl RouteGeometryProvider for GoogleMapsClient {
    async fn route_path(
        &self,
        origin: &Waypoint,
        destination: &Waypoint,
        mode: TravelMode,
    ) -> Result<Option<Vec<LatLng>>, ProviderError> {
        let route = self.directions(origin, destination, mode).await?;
        let path = route
            .and_then(|r| r.overview_polyline)
            .map(|p| decode_polyline(&p.points))
            .filter(|path| path.len() >= 2);
        debug!(
            "Route geometry {} -> {}: {} points",
            origin,
            destination,
            path.as_ref().map_or(0, |p| p.len())
        );
        Ok(path)
    }
}

/// Decodes Google's encoded polyline format (precision 1e-5). Decoding stops
/// at the first malformed value; the points before it are kept.
pub fn decode_polyline(encoded: &str) -> Vec<LatLng> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let (mut lat, mut lng) = (0i64, 0i64);
    let mut path = Vec::new();

    let next_delta = |index: &mut usize| -> Option<i64> {
        let mut result: i64 = 0;
        let mut shift = 0;
        loop {
            // a truncated or corrupt run of continuation bytes
            if shift > 60 {
                return None;
            }
            let b = (*bytes.get(*index)? as i64) - 63;
            *index += 1;
            result |= (b & 0x1f) << shift;
            shift += 5;
            if b < 0x20 {
                break;
            }
        }
        Some(if result & 1 != 0 { !(result >> 1) } else { result >> 1 })
    };

    while index < bytes.len() {
        let (Some(dlat), Some(dlng)) = (next_delta(&mut index), next_delta(&mut index)) else {
            break;
        };
        lat += dlat;
        lng += dlng;
        path.push(LatLng::new(lat as f64 / 1e5, lng as f64 / 1e5));
    }
    path
}

#[derive(Debug, Deserialize)]
pub(crate) struct DistanceMatrixResponse {
    status: String,
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
struct Element {
    status: String,
    duration: Option<Value>,
    distance: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Value {
    value: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DirectionsRoute {
    #[serde(default)]
    pub(crate) legs: Vec<DirectionsLeg>,
    overview_polyline: Option<Polyline>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DirectionsLeg {
    #[serde(default)]
    pub(crate) steps: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Polyline {
    points: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

impl From<Location> for LatLng {
    fn from(l: Location) -> Self {
        LatLng::new(l.lat, l.lng)
    }
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceResult>,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    geometry: Geometry,
    name: Option<String>,
    rating: Option<f64>,
    user_ratings_total: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_reference_polyline() {
        // Example from Google's polyline algorithm documentation.
        let path = decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@");
        assert_eq!(path.len(), 3);
        assert!((path[0].lat - 38.5).abs() < 1e-9 && (path[0].lng + 120.2).abs() < 1e-9);
        assert!((path[1].lat - 40.7).abs() < 1e-9 && (path[1].lng + 120.95).abs() < 1e-9);
        assert!((path[2].lat - 43.252).abs() < 1e-9 && (path[2].lng + 126.453).abs() < 1e-9);
    }

    #[test]
    fn truncated_polyline_keeps_complete_points() {
        assert_eq!(decode_polyline("_p~iF~ps|U_ulL").len(), 1);
        assert!(decode_polyline("").is_empty());
    }

    #[test]
    fn runaway_continuation_bytes_stop_decoding() {
        assert!(decode_polyline("~~~~~~~~~~~~~~~~~~~~").is_empty());
        let path = decode_polyline("_p~iF~ps|U~~~~~~~~~~~~~~~~~~~~");
        assert_eq!(path.len(), 1);
        assert!((path[0].lat - 38.5).abs() < 1e-9);
    }

    /// Answers a single HTTP request with `body` and returns the base URL.
    async fn serve_once(body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let read = socket.read(&mut buf).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn local_client(base_url: String) -> GoogleMapsClient {
        GoogleMapsClient::new("test-key", &Settings::default())
            .unwrap()
            .with_base_url(base_url)
    }

    #[tokio::test]
    async fn route_path_decodes_the_overview_polyline() {
        let base = serve_once(
            r#"{"status":"OK","routes":[{"legs":[{"steps":[{},{}]}],
                "overview_polyline":{"points":"_p~iF~ps|U_ulLnnqC_mqNvxq`@"}}]}"#,
        )
        .await;
        let client = local_client(base);

        let path = client
            .route_path(&Waypoint::from("A"), &Waypoint::from("B"), TravelMode::Driving)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(path.len(), 3);
        assert!((path[2].lng + 126.453).abs() < 1e-9);
    }

    #[tokio::test]
    async fn corrupt_overview_polyline_yields_no_path() {
        let base = serve_once(
            r#"{"status":"OK","routes":[{"overview_polyline":{"points":"~~~~~~~~~~~~~~~~~~~~"}}]}"#,
        )
        .await;
        let client = local_client(base);

        let path = client
            .route_path(&Waypoint::from("A"), &Waypoint::from("B"), TravelMode::Driving)
            .await
            .unwrap();
        assert!(path.is_none());
    }

    #[test]
    fn avoid_joins_flags() {
        assert_eq!(avoid_param(true, true), "highways|tolls");
        assert_eq!(avoid_param(false, true), "tolls");
        assert_eq!(avoid_param(false, false), "");
    }

    #[test]
    fn unreachable_elements_parse() {
        let raw = r#"{"status":"OK","rows":[{"elements":[
            {"status":"OK","duration":{"value":60},"distance":{"value":1000}},
            {"status":"ZERO_RESULTS"}]}]}"#;
        let parsed: DistanceMatrixResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.rows[0].elements.len(), 2);
        assert!(parsed.rows[0].elements[1].duration.is_none());
    }
}
