//! Ordering engine for multi-stop trips.
//!
//! Fetches pairwise cost matrices from a routing service, orders the stops
//! under a fixed start, an optional fixed finish and precedence constraints,
//! and can splice refuel stops into the finished route.

pub mod api;
pub mod app;
pub mod config;
pub mod distance;
pub mod domain;
pub mod error;
pub mod evaluation;
pub mod fuel;
pub mod plan;
pub mod services;
pub mod solver;

pub use distance::{CostMatrixProvider, TravelMatrices};
pub use domain::solution::{AugmentedRoute, AugmentedStop, RouteOrder, RouteResult};
pub use domain::types::{
    LatLng, OptimizeOptions, Precedence, RouteConfig, SolverKind, Strategy, TravelMode, Waypoint,
};
pub use error::{PlanError, ProviderError, RouteError};
pub use solver::{compute_best_route, suggest_best_departure};
