use serde::Serialize;

use crate::domain::types::{Strategy, Waypoint};

/// A visiting order and its cost under the matrix that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOrder {
    pub order: Vec<usize>,
    pub total_cost: f64,
}

/// Outcome of the optimisation pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct RouteResult {
    pub order: Vec<usize>,
    pub ordered_waypoints: Vec<Waypoint>,
    pub strategy: Strategy,
    /// Cost under the matrix the strategy optimised.
    pub optimized_cost: f64,
    /// Always recomputed from the time matrix.
    pub total_seconds: f64,
    pub total_meters: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AugmentedStop {
    pub waypoint: Waypoint,
    pub is_refuel_stop: bool,
    pub fuel_level_after_percent: f64,
    pub distance_from_previous_miles: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AugmentedRoute {
    pub stops: Vec<AugmentedStop>,
    pub total_distance_miles: f64,
    pub refuel_stops_added: usize,
    pub warnings: Vec<String>,
}

impl AugmentedRoute {
    pub fn waypoints(&self) -> Vec<Waypoint> {
        self.stops.iter().map(|s| s.waypoint.clone()).collect()
    }
}

/// One row of a departure-time comparison.
#[derive(Debug, Clone, Serialize)]
pub struct DepartureOption {
    pub offset_minutes: i64,
    pub total_seconds: f64,
    pub order: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartureSuggestion {
    pub best_offset_minutes: i64,
    pub best_seconds: f64,
    pub best_order: Vec<usize>,
    pub results: Vec<DepartureOption>,
}
