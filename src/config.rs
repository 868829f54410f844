use std::env;
use std::time::Duration;

use dotenv::dotenv;
use tracing::{info, warn};

use crate::error::RouteError;

pub mod constant {
    pub const MAX_LOCAL_SEARCH_PASSES: usize = 60;
    pub const IMPROVEMENT_EPSILON: f64 = 1e-6;

    pub const EXACT_SOLVER_MAX_NODES: usize = 16;
    pub const TURN_MATRIX_MAX_NODES: usize = 10;

    pub const EARTH_RADIUS_MILES: f64 = 3958.7613;
    pub const METERS_PER_MILE: f64 = 1609.344;

    pub const STATION_CATEGORY: &str = "gas_station";
    pub const STATION_BASE_RADIUS_METERS: f64 = 8000.0;
    pub const STATION_RADIUS_FACTORS: [f64; 4] = [1.0, 1.5, 2.25, 3.0];
    pub const FALLBACK_PROBE_FRACTIONS: [f64; 3] = [1.0 / 3.0, 0.5, 2.0 / 3.0];
    pub const MIN_REFUEL_BUFFER_MILES: f64 = 10.0;
    pub const REFUEL_BUFFER_FRACTION: f64 = 0.1;
    // Guards against a leg that keeps asking for stations without getting closer.
    pub const MAX_REFUELS_PER_LEG: usize = 8;

    pub const GOOGLE_BATCH: usize = 10;
    pub const DEFAULT_OSRM_BASE_URL: &str = "https://router.project-osrm.org";
    pub const DEFAULT_USER_AGENT: &str = "optipath/0.1";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
}

/// Runtime settings read from the environment (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct Settings {
    pub distance_provider: String,
    pub google_api_key: Option<String>,
    pub osrm_base_url: String,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, RouteError> {
        dotenv().ok();

        let distance_provider = env::var("DISTANCE_PROVIDER")
            .map(|p| p.trim().to_lowercase())
            .unwrap_or_else(|_| {
                warn!("DISTANCE_PROVIDER not set, defaulting to 'osrm'");
                "osrm".to_string()
            });

        let google_api_key = env::var("GOOGLE_API_KEY").ok().filter(|k| !k.is_empty());
        if distance_provider == "google" && google_api_key.is_none() {
            return Err(RouteError::Config(
                "DISTANCE_PROVIDER is 'google' but GOOGLE_API_KEY is not set".to_string(),
            ));
        }

        let osrm_base_url = env::var("OSRM_BASE_URL")
            .unwrap_or_else(|_| constant::DEFAULT_OSRM_BASE_URL.to_string());

        let timeout_secs = match env::var("REQUEST_TIMEOUT_SECS") {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|e| {
                RouteError::Config(format!("REQUEST_TIMEOUT_SECS '{raw}' is not a number: {e}"))
            })?,
            Err(_) => constant::DEFAULT_TIMEOUT_SECS,
        };

        let user_agent =
            env::var("USER_AGENT").unwrap_or_else(|_| constant::DEFAULT_USER_AGENT.to_string());

        info!(
            "Loaded settings: provider '{}', OSRM at {}, timeout {}s",
            distance_provider, osrm_base_url, timeout_secs
        );

        Ok(Self {
            distance_provider,
            google_api_key,
            osrm_base_url,
            request_timeout: Duration::from_secs(timeout_secs),
            user_agent,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            distance_provider: "osrm".to_string(),
            google_api_key: None,
            osrm_base_url: constant::DEFAULT_OSRM_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(constant::DEFAULT_TIMEOUT_SECS),
            user_agent: constant::DEFAULT_USER_AGENT.to_string(),
        }
    }
}
