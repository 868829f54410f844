use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info};

use crate::api::osrm_api::OsrmClient;
use crate::distance::matrix::{CostMatrixProvider, TravelMatrices};
use crate::domain::types::{CostMatrix, MatrixRequest, TravelMode, Waypoint};
use crate::error::ProviderError;

#[async_trait]
impl CostMatrixProvider for OsrmClient {
    fn name(&self) -> &str {
        "osrm"
    }

    /// One table call. OSRM has no traffic model, so departure time and
    /// avoidance flags are ignored.
    async fn travel_matrices(&self, request: &MatrixRequest) -> Result<TravelMatrices, ProviderError> {
        if request.avoid_highways || request.avoid_tolls || request.departure_time.is_some() {
            debug!("OSRM ignores departure time and avoidance options");
        }
        let (time_seconds, distance_meters) = self.table(&request.waypoints, request.mode).await?;
        info!("OSRM returned a {}x{} table", time_seconds.len(), time_seconds.len());
        Ok(TravelMatrices {
            time_seconds,
            distance_meters,
        })
    }

    async fn turn_matrix(
        &self,
        waypoints: &[Waypoint],
        mode: TravelMode,
    ) -> Result<CostMatrix, ProviderError> {
        let n = waypoints.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .collect();

        let results = join_all(pairs.iter().map(|&(i, j)| {
            let pair = [waypoints[i].clone(), waypoints[j].clone()];
            async move { self.route(&pair, mode, "steps=true&overview=false").await }
        }))
        .await;

        let mut turns = vec![vec![0.0; n]; n];
        for (&(i, j), result) in pairs.iter().zip(results) {
            turns[i][j] = match result? {
                Some(route) => route.legs.iter().map(|l| l.steps.len()).sum::<usize>() as f64,
                None => f64::INFINITY,
            };
        }
        Ok(turns)
    }
}
