use thiserror::Error;

/// Failures talking to an external routing, geocoding or places service.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned status {status}")]
    Status { service: &'static str, status: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("could not resolve waypoint '{0}' to coordinates")]
    UnresolvedWaypoint(String),

    #[error("{provider} does not support travel mode {mode}")]
    UnsupportedMode {
        provider: &'static str,
        mode: String,
    },

    #[error("request URL too long ({0} chars); use a self-hosted router or fewer waypoints")]
    RequestTooLarge(usize),

    #[error("background request task failed: {0}")]
    Task(String),

    #[error("failed to read matrix file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse matrix CSV: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("cost matrix provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("no waypoints given")]
    EmptyWaypoints,

    #[error("{name} {index} is out of range for {len} waypoints")]
    IndexOutOfRange {
        name: &'static str,
        index: usize,
        len: usize,
    },

    #[error("{solver} supports at most {max} waypoints, got {n}")]
    TooManyNodes {
        solver: &'static str,
        n: usize,
        max: usize,
    },

    #[error("the exact solver cannot honour precedence constraints or a fixed finish")]
    UnsupportedConstraints,

    #[error("invalid fuel configuration: {0}")]
    InvalidFuelConfig(String),

    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("planner output contains no JSON object")]
    NoJsonObject,

    #[error("planner JSON does not match the plan schema: {0}")]
    Schema(#[from] serde_json::Error),
}
