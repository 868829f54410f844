use async_trait::async_trait;
use futures::future::join_all;
use tokio::task;
use tracing::{debug, error, info};

use crate::api::google_api::GoogleMapsClient;
use crate::config::constant::GOOGLE_BATCH;
use crate::distance::matrix::{CostMatrixProvider, TravelMatrices};
use crate::domain::types::{CostMatrix, MatrixRequest, TravelMode, Waypoint};
use crate::error::ProviderError;

#[async_trait]
impl CostMatrixProvider for GoogleMapsClient {
    fn name(&self) -> &str {
        "google"
    }

    /// Fetches the matrix in `GOOGLE_BATCH`-sized tiles, all in flight at once.
    async fn travel_matrices(&self, request: &MatrixRequest) -> Result<TravelMatrices, ProviderError> {
        let n = request.waypoints.len();
        let blocks = tile_bounds(n, GOOGLE_BATCH);
        info!(
            "Requesting {}x{} Google matrix in {} tiles",
            n,
            n,
            blocks.len() * blocks.len()
        );

        let mut tasks = Vec::new();
        for &(row_start, row_end) in &blocks {
            for &(col_start, col_end) in &blocks {
                let client = self.clone();
                let request = request.clone();
                tasks.push(task::spawn(async move {
                    let origins = &request.waypoints[row_start..row_end];
                    let destinations = &request.waypoints[col_start..col_end];
                    let block = client
                        .distance_matrix_block(origins, destinations, &request)
                        .await;
                    (row_start, col_start, block)
                }));
            }
        }

        let mut time_seconds = vec![vec![f64::INFINITY; n]; n];
        let mut distance_meters = vec![vec![f64::INFINITY; n]; n];
        for joined in join_all(tasks).await {
            let (row_start, col_start, block) =
                joined.map_err(|e| ProviderError::Task(e.to_string()))?;
            let (times, distances) = block.map_err(|e| {
                error!("Error fetching distance matrix tile: {}", e);
                e
            })?;
            place_block(&mut time_seconds, &times, row_start, col_start);
            place_block(&mut distance_meters, &distances, row_start, col_start);
        }

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
        debug!("Requesting directions for {} ordered pairs", pairs.len());

        let results = join_all(
            pairs
                .iter()
                .map(|&(i, j)| self.directions(&waypoints[i], &waypoints[j], mode)),
        )
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

/// `[start, end)` ranges covering `0..n` in chunks of `size`.
fn tile_bounds(n: usize, size: usize) -> Vec<(usize, usize)> {
    (0..n)
        .step_by(size)
        .map(|start| (start, (start + size).min(n)))
        .collect()
}

fn place_block(target: &mut CostMatrix, block: &[Vec<f64>], row_start: usize, col_start: usize) {
    for (r, row) in block.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if let Some(cell) = target
                .get_mut(row_start + r)
                .and_then(|target_row| target_row.get_mut(col_start + c))
            {
                *cell = *value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_cover_partial_batches() {
        assert_eq!(tile_bounds(23, 10), vec![(0, 10), (10, 20), (20, 23)]);
        assert_eq!(tile_bounds(10, 10), vec![(0, 10)]);
        assert!(tile_bounds(0, 10).is_empty());
    }

    #[test]
    fn blocks_land_at_their_offsets() {
        let mut m = vec![vec![f64::INFINITY; 3]; 3];
        place_block(&mut m, &[vec![7.0, 8.0]], 2, 1);
        assert_eq!(m[2], vec![f64::INFINITY, 7.0, 8.0]);
        assert!(m[0].iter().all(|v| v.is_infinite()));
    }
}
