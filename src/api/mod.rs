pub mod google_api;
pub mod osrm_api;

pub use google_api::GoogleMapsClient;
pub use osrm_api::OsrmClient;
