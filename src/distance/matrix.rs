use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::api::google_api::GoogleMapsClient;
use crate::api::osrm_api::OsrmClient;
use crate::config::constant::TURN_MATRIX_MAX_NODES;
use crate::config::Settings;
use crate::domain::types::{CostMatrix, MatrixRequest, Strategy, TravelMode, Waypoint};
use crate::error::{ProviderError, RouteError};

use super::providers::fixed::FixedMatrixProvider;

/// Time (seconds) and distance (meters) between every ordered waypoint pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelMatrices {
    pub time_seconds: CostMatrix,
    pub distance_meters: CostMatrix,
}

/// Supplies the cost matrices the solvers run on.
///
/// Unreachable pairs are `f64::INFINITY`; the diagonal is zero. Any `Err`
/// aborts the whole computation.
#[async_trait]
pub trait CostMatrixProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn travel_matrices(&self, request: &MatrixRequest) -> Result<TravelMatrices, ProviderError>;

    /// Maneuver-step counts, one route query per ordered pair.
    async fn turn_matrix(
        &self,
        waypoints: &[Waypoint],
        mode: TravelMode,
    ) -> Result<CostMatrix, ProviderError>;
}

/// The matrices fetched for one optimisation, plus the one that drives it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSet {
    pub travel: TravelMatrices,
    pub turns: Option<CostMatrix>,
}

impl MatrixSet {
    /// The matrix the given strategy optimises.
    pub fn driving(&self, strategy: Strategy) -> &CostMatrix {
        match strategy {
            Strategy::Fastest => &self.travel.time_seconds,
            Strategy::ShortestDistance => &self.travel.distance_meters,
            Strategy::LeastTurns => self
                .turns
                .as_ref()
                .unwrap_or(&self.travel.time_seconds),
        }
    }
}

/// Fetch every matrix `strategy` needs from `provider`.
pub async fn create_matrices(
    provider: &dyn CostMatrixProvider,
    request: &MatrixRequest,
    strategy: Strategy,
) -> Result<MatrixSet, RouteError> {
    let n = request.waypoints.len();
    info!(
        "Creating matrices using provider '{}' ({} waypoints, {} mode, {:?})",
        provider.name(),
        n,
        request.mode,
        strategy
    );

    let travel = provider.travel_matrices(request).await.map_err(|e| {
        error!("{} matrix request failed: {}", provider.name(), e);
        e
    })?;
    let travel = TravelMatrices {
        time_seconds: normalize(travel.time_seconds, n)?,
        distance_meters: normalize(travel.distance_meters, n)?,
    };

    let turns = if strategy == Strategy::LeastTurns {
        if n > TURN_MATRIX_MAX_NODES {
            return Err(RouteError::TooManyNodes {
                solver: "turn matrix",
                n,
                max: TURN_MATRIX_MAX_NODES,
            });
        }
        let turns = provider
            .turn_matrix(&request.waypoints, request.mode)
            .await?;
        Some(normalize(turns, n)?)
    } else {
        None
    };

    debug!("Time matrix: {:?}", travel.time_seconds);
    Ok(MatrixSet { travel, turns })
}

/// Checks the shape, forces a zero diagonal and maps NaN or negative cells
/// to "no edge".
pub fn normalize(mut dm: CostMatrix, n: usize) -> Result<CostMatrix, ProviderError> {
    if dm.len() != n {
        return Err(ProviderError::MalformedResponse(format!(
            "expected {n} matrix rows, got {}",
            dm.len()
        )));
    }
    for (i, row) in dm.iter_mut().enumerate() {
        if row.len() != n {
            return Err(ProviderError::MalformedResponse(format!(
                "matrix row {i} has {} columns, expected {n}",
                row.len()
            )));
        }
        for (j, cell) in row.iter_mut().enumerate() {
            if i == j {
                *cell = 0.0;
            } else if cell.is_nan() || *cell < 0.0 {
                *cell = f64::INFINITY;
            }
        }
    }
    Ok(dm)
}

/// Build the provider named by `settings.distance_provider`.
///
/// `csv` reads its matrices from `TIME_MATRIX_CSV`, `DISTANCE_MATRIX_CSV`
/// and the optional `TURN_MATRIX_CSV`.
pub fn build_provider(settings: &Settings) -> Result<Arc<dyn CostMatrixProvider>, RouteError> {
    match settings.distance_provider.as_str() {
        "google" => {
            let key = settings.google_api_key.as_deref().ok_or_else(|| {
                RouteError::Config("GOOGLE_API_KEY required for Google source".to_string())
            })?;
            let client = GoogleMapsClient::new(key, settings)?;
            Ok(Arc::new(client))
        }
        "osrm" => {
            let mut client = OsrmClient::new(&settings.osrm_base_url, settings)?;
            if let Some(key) = settings.google_api_key.as_deref() {
                let geocoder = GoogleMapsClient::new(key, settings)?;
                client = client.with_geocoder(Arc::new(geocoder));
            }
            Ok(Arc::new(client))
        }
        "csv" => {
            let var = |name: &str| {
                std::env::var(name).map_err(|_| RouteError::Config(format!("{name} is not set")))
            };
            let time = var("TIME_MATRIX_CSV")?;
            let distance = var("DISTANCE_MATRIX_CSV")?;
            let turns = std::env::var("TURN_MATRIX_CSV").ok();
            let provider = FixedMatrixProvider::from_csv_files(&time, &distance, turns.as_deref())?;
            Ok(Arc::new(provider))
        }
        other => {
            error!("Unknown distance matrix source: {}", other);
            Err(RouteError::Config(format!(
                "unknown DISTANCE_PROVIDER '{other}' (expected google, osrm or csv)"
            )))
        }
    }
}
