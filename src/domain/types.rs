use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RouteError;

/// Square matrix of pairwise leg costs. `f64::INFINITY` marks a missing edge.
pub type CostMatrix = Vec<Vec<f64>>;

/// `after -> [before, ...]`: every `before` must be visited earlier than `after`.
pub type Precedence = BTreeMap<usize, Vec<usize>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Linear interpolation towards `other`; `t = 0` is `self`.
    pub fn lerp(&self, other: &LatLng, t: f64) -> LatLng {
        LatLng {
            lat: self.lat + (other.lat - self.lat) * t,
            lng: self.lng + (other.lng - self.lng) * t,
        }
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// A stop on the trip. Solvers only ever see its index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Waypoint {
    Coord(LatLng),
    Address(String),
}

impl Waypoint {
    pub fn coord(&self) -> Option<LatLng> {
        match self {
            Waypoint::Coord(c) => Some(*c),
            Waypoint::Address(_) => None,
        }
    }
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Waypoint::Coord(c) => write!(f, "{c}"),
            Waypoint::Address(a) => f.write_str(a),
        }
    }
}

impl From<LatLng> for Waypoint {
    fn from(c: LatLng) -> Self {
        Waypoint::Coord(c)
    }
}

impl From<&str> for Waypoint {
    fn from(a: &str) -> Self {
        Waypoint::Address(a.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Bicycling,
    Transit,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
            TravelMode::Transit => "transit",
        }
    }

    /// Only driving consumes fuel.
    pub fn supports_range(&self) -> bool {
        matches!(self, TravelMode::Driving)
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TravelMode {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "driving" | "drive" => Ok(TravelMode::Driving),
            "walking" | "walk" => Ok(TravelMode::Walking),
            "bicycling" | "cycling" | "bike" => Ok(TravelMode::Bicycling),
            "transit" => Ok(TravelMode::Transit),
            other => Err(RouteError::Config(format!("unknown travel mode '{other}'"))),
        }
    }
}

/// Which matrix drives the optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    #[default]
    Fastest,
    ShortestDistance,
    LeastTurns,
}

impl std::str::FromStr for Strategy {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "fastest" | "time" => Ok(Strategy::Fastest),
            "shortest" | "shortest distance" | "distance" => Ok(Strategy::ShortestDistance),
            "least turns" | "turns" => Ok(Strategy::LeastTurns),
            other => Err(RouteError::Config(format!("unknown strategy '{other}'"))),
        }
    }
}

/// Which ordering algorithm runs over the chosen matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverKind {
    /// Constrained nearest neighbour followed by 2-opt/relocate local search.
    #[default]
    Heuristic,
    /// Uniform-cost search; small instances only, no precedence or fixed finish.
    Exact,
}

impl std::str::FromStr for SolverKind {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heuristic" | "nn2opt" | "local" => Ok(SolverKind::Heuristic),
            "exact" | "ucs" => Ok(SolverKind::Exact),
            other => Err(RouteError::Config(format!("unknown solver '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteConfig {
    pub start_index: usize,
    pub end_index: Option<usize>,
    pub round_trip: bool,
}

impl RouteConfig {
    pub fn open(start_index: usize) -> Self {
        Self {
            start_index,
            end_index: None,
            round_trip: false,
        }
    }

    pub fn round_trip(start_index: usize) -> Self {
        Self {
            start_index,
            end_index: None,
            round_trip: true,
        }
    }

    pub fn with_end(mut self, end_index: usize) -> Self {
        self.end_index = Some(end_index);
        self
    }

    /// The finish that must sit last, if any. Ignored on round trips.
    pub fn fixed_end(&self) -> Option<usize> {
        if self.round_trip {
            None
        } else {
            self.end_index
        }
    }

    /// Range-checks the indices against `n` waypoints.
    ///
    /// A finish equal to the start on an open path means "come back here",
    /// so it is normalised into a round trip.
    pub fn validated(self, n: usize) -> Result<Self, RouteError> {
        if n == 0 {
            return Err(RouteError::EmptyWaypoints);
        }
        if self.start_index >= n {
            return Err(RouteError::IndexOutOfRange {
                name: "start index",
                index: self.start_index,
                len: n,
            });
        }
        match self.fixed_end() {
            Some(end) if end >= n => Err(RouteError::IndexOutOfRange {
                name: "end index",
                index: end,
                len: n,
            }),
            Some(end) if end == self.start_index => Ok(Self {
                end_index: None,
                round_trip: true,
                ..self
            }),
            _ => Ok(self),
        }
    }
}

/// Inputs forwarded to a [`crate::distance::matrix::CostMatrixProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRequest {
    pub waypoints: Vec<Waypoint>,
    pub mode: TravelMode,
    pub departure_time: Option<DateTime<Utc>>,
    pub avoid_highways: bool,
    pub avoid_tolls: bool,
}

impl MatrixRequest {
    pub fn new(waypoints: Vec<Waypoint>, mode: TravelMode) -> Self {
        Self {
            waypoints,
            mode,
            departure_time: None,
            avoid_highways: false,
            avoid_tolls: false,
        }
    }
}

/// Everything the optimisation pipeline needs besides the waypoints.
#[derive(Debug, Clone, Default)]
pub struct OptimizeOptions {
    pub mode: TravelMode,
    pub strategy: Strategy,
    pub solver: SolverKind,
    pub route: RouteConfig,
    pub precedence: Precedence,
    pub departure_time: Option<DateTime<Utc>>,
    pub avoid_highways: bool,
    pub avoid_tolls: bool,
}
