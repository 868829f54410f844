use async_trait::async_trait;
use csv::ReaderBuilder;
use tracing::{debug, info};

use crate::distance::matrix::{CostMatrixProvider, TravelMatrices};
use crate::domain::types::{CostMatrix, MatrixRequest, TravelMode, Waypoint};
use crate::error::ProviderError;

/// Matrices known up front, e.g. precomputed or loaded from CSV.
///
/// Ignores the request options; the turn matrix falls back to the time
/// matrix when none was supplied.
#[derive(Debug, Clone)]
pub struct FixedMatrixProvider {
    time_seconds: CostMatrix,
    distance_meters: CostMatrix,
    turns: Option<CostMatrix>,
}

impl FixedMatrixProvider {
    pub fn new(time_seconds: CostMatrix, distance_meters: CostMatrix) -> Self {
        Self {
            time_seconds,
            distance_meters,
            turns: None,
        }
    }

    pub fn with_turns(mut self, turns: CostMatrix) -> Self {
        self.turns = Some(turns);
        self
    }

    pub fn from_csv_files(
        time_path: &str,
        distance_path: &str,
        turns_path: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let mut provider = Self::new(read_matrix_csv(time_path)?, read_matrix_csv(distance_path)?);
        if let Some(path) = turns_path {
            provider = provider.with_turns(read_matrix_csv(path)?);
        }
        info!(
            "Loaded {}x{} matrices from CSV",
            provider.time_seconds.len(),
            provider.time_seconds.len()
        );
        Ok(provider)
    }
}

#[async_trait]
impl CostMatrixProvider for FixedMatrixProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn travel_matrices(&self, request: &MatrixRequest) -> Result<TravelMatrices, ProviderError> {
        debug!(
            "Serving fixed matrices for {} waypoints",
            request.waypoints.len()
        );
        Ok(TravelMatrices {
            time_seconds: self.time_seconds.clone(),
            distance_meters: self.distance_meters.clone(),
        })
    }

    async fn turn_matrix(
        &self,
        _waypoints: &[Waypoint],
        _mode: TravelMode,
    ) -> Result<CostMatrix, ProviderError> {
        Ok(self
            .turns
            .clone()
            .unwrap_or_else(|| self.time_seconds.clone()))
    }
}

/// Reads a headerless numeric matrix. Empty cells and `inf` mean "no edge".
pub fn read_matrix_csv(path: &str) -> Result<CostMatrix, ProviderError> {
    let reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)?;
    parse_matrix(reader)
}

pub fn parse_matrix_str(data: &str) -> Result<CostMatrix, ProviderError> {
    let reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());
    parse_matrix(reader)
}

fn parse_matrix<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<CostMatrix, ProviderError> {
    let mut matrix = Vec::new();
    for (row_idx, row) in reader.records().enumerate() {
        let record = row?;
        let parsed = record
            .iter()
            .enumerate()
            .map(|(col, raw)| parse_cell(raw).ok_or_else(|| {
                ProviderError::MalformedResponse(format!(
                    "cell ({row_idx}, {col}) '{raw}' is not a number"
                ))
            }))
            .collect::<Result<Vec<f64>, _>>()?;
        matrix.push(parsed);
    }
    Ok(matrix)
}

fn parse_cell(raw: &str) -> Option<f64> {
    match raw.to_lowercase().as_str() {
        "" | "inf" | "infinity" | "-" => Some(f64::INFINITY),
        other => other.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_and_gaps() {
        let dm = parse_matrix_str("0, 12.5, inf\n3,0,\n1,2,0\n").unwrap();
        assert_eq!(dm[0], vec![0.0, 12.5, f64::INFINITY]);
        assert!(dm[1][2].is_infinite());
        assert_eq!(dm[2], vec![1.0, 2.0, 0.0]);
    }

    #[test]
    fn rejects_garbage_cells() {
        assert!(matches!(
            parse_matrix_str("0,abc\n1,0\n"),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn turn_matrix_defaults_to_time() {
        let p = FixedMatrixProvider::new(vec![vec![0.0, 7.0], vec![7.0, 0.0]], vec![vec![0.0; 2]; 2]);
        let turns = p.turn_matrix(&[], TravelMode::Walking).await.unwrap();
        assert_eq!(turns[0][1], 7.0);
    }
}
