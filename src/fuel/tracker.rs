//! Walks a fixed route leg by leg, tracking fuel, and splices in refuel stops
//! where the tank would otherwise drop below the threshold.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, span, warn, Instrument, Level};

use crate::config::constant::{MAX_REFUELS_PER_LEG, MIN_REFUEL_BUFFER_MILES, REFUEL_BUFFER_FRACTION};
use crate::domain::solution::{AugmentedRoute, AugmentedStop};
use crate::domain::types::{TravelMode, Waypoint};
use crate::error::RouteError;
use crate::services::{
    resolve, Geocoder, LegDistanceProvider, PointOfInterestLocator, RouteGeometryProvider,
};

use super::geometry::haversine_miles;
use super::stations::best_station_between;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuelConfig {
    pub current_fuel_percent: f64,
    pub tank_capacity_gallons: f64,
    pub mpg: f64,
    pub refuel_threshold_percent: f64,
}

impl FuelConfig {
    pub fn validate(&self) -> Result<(), RouteError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(RouteError::InvalidFuelConfig(format!("{name} must be positive, got {v}")))
            }
        };
        let percent = |name: &str, v: f64| {
            if (0.0..=100.0).contains(&v) {
                Ok(())
            } else {
                Err(RouteError::InvalidFuelConfig(format!("{name} must be within 0..=100, got {v}")))
            }
        };
        positive("tank capacity", self.tank_capacity_gallons)?;
        positive("mpg", self.mpg)?;
        percent("current fuel", self.current_fuel_percent)?;
        percent("refuel threshold", self.refuel_threshold_percent)
    }

    pub fn full_range_miles(&self) -> f64 {
        self.tank_capacity_gallons * self.mpg
    }

    pub fn threshold_miles(&self) -> f64 {
        self.full_range_miles() * self.refuel_threshold_percent / 100.0
    }

    pub fn current_range_miles(&self) -> f64 {
        self.full_range_miles() * self.current_fuel_percent / 100.0
    }

    /// How far short of the threshold we aim to stop.
    pub fn buffer_miles(&self) -> f64 {
        MIN_REFUEL_BUFFER_MILES.max(REFUEL_BUFFER_FRACTION * self.full_range_miles())
    }
}

/// The collaborators the fuel pass talks to.
#[derive(Clone, Copy)]
pub struct FuelServices<'a> {
    pub legs: &'a dyn LegDistanceProvider,
    pub geometry: &'a dyn RouteGeometryProvider,
    pub places: &'a dyn PointOfInterestLocator,
    pub geocoder: &'a dyn Geocoder,
}

impl<'a> FuelServices<'a> {
    /// All four roles played by one client.
    pub fn from_client<C>(client: &'a C) -> Self
    where
        C: LegDistanceProvider + RouteGeometryProvider + PointOfInterestLocator + Geocoder,
    {
        Self {
            legs: client,
            geometry: client,
            places: client,
            geocoder: client,
        }
    }
}

struct FuelState {
    full: f64,
    threshold: f64,
    remaining: f64,
    total_miles: f64,
}

impl FuelState {
    fn level_percent(&self) -> f64 {
        (self.remaining / self.full * 100.0).clamp(0.0, 100.0)
    }
}

/// Insert refuel stops into `ordered` without reordering it.
///
/// Non-driving modes get the route back unchanged with a single warning.
pub async fn add_refuel_stops(
    services: &FuelServices<'_>,
    ordered: &[Waypoint],
    fuel: &FuelConfig,
    mode: TravelMode,
) -> Result<AugmentedRoute, RouteError> {
    fuel.validate()?;
    if ordered.is_empty() {
        return Err(RouteError::EmptyWaypoints);
    }

    if !mode.supports_range() {
        warn!("Fuel tracking requested for {} mode; skipping", mode);
        return Ok(AugmentedRoute {
            stops: ordered
                .iter()
                .map(|w| AugmentedStop {
                    waypoint: w.clone(),
                    is_refuel_stop: false,
                    fuel_level_after_percent: fuel.current_fuel_percent,
                    distance_from_previous_miles: None,
                })
                .collect(),
            total_distance_miles: 0.0,
            refuel_stops_added: 0,
            warnings: vec!["Fuel tracking only applies to driving mode.".to_string()],
        });
    }

    let mut state = FuelState {
        full: fuel.full_range_miles(),
        threshold: fuel.threshold_miles(),
        remaining: fuel.current_range_miles(),
        total_miles: 0.0,
    };
    let mut warnings = Vec::new();
    let mut refuels = 0;
    let mut stops = vec![AugmentedStop {
        waypoint: ordered[0].clone(),
        is_refuel_stop: false,
        fuel_level_after_percent: state.level_percent(),
        distance_from_previous_miles: None,
    }];

    for (leg, pair) in ordered.windows(2).enumerate() {
        let leg_span = span!(Level::DEBUG, "fuel_leg", leg);
        let destination = &pair[1];
        let mut origin = pair[0].clone();
        let mut inserted_on_leg = 0;

        loop {
            let leg_miles = measure_leg(services, &origin, destination, mode, &mut warnings)
                .instrument(leg_span.clone())
                .await;
            let after = state.remaining - leg_miles;

            if after >= state.threshold {
                state.remaining = after;
                state.total_miles += leg_miles;
                stops.push(arrival(destination, &state, leg_miles));
                break;
            }

            let target = (state.remaining - (state.threshold + fuel.buffer_miles())).max(0.0);
            debug!(
                "{} -> {}: {:.1} mi with {:.1} mi left; looking for fuel {:.1} mi out",
                origin, destination, leg_miles, state.remaining, target
            );

            let station = if inserted_on_leg >= MAX_REFUELS_PER_LEG {
                warn!("Refuel cap of {} reached on leg {}", MAX_REFUELS_PER_LEG, leg);
                warnings.push(format!(
                    "Stopped adding refuel stops after {MAX_REFUELS_PER_LEG} on the leg {origin} -> {destination}; proceeding without another."
                ));
                None
            } else {
                let found = best_station_between(services, &origin, destination, mode, Some(target))
                    .instrument(leg_span.clone())
                    .await
                    // a station at the current position would never get us further
                    .filter(|s| origin.coord() != Some(*s));
                if found.is_none() {
                    warn!("No gas station found between {} and {}", origin, destination);
                    warnings.push(format!(
                        "No gas station found on the leg {origin} -> {destination}; proceeding without a refuel stop."
                    ));
                }
                found
            };

            let Some(station) = station else {
                state.remaining = after.max(0.0);
                state.total_miles += leg_miles;
                stops.push(arrival(destination, &state, leg_miles));
                break;
            };

            let station = Waypoint::Coord(station);
            let to_station = measure_leg(services, &origin, &station, mode, &mut warnings)
                .instrument(leg_span.clone())
                .await;
            state.total_miles += to_station;
            state.remaining = fuel.full_range_miles();
            info!("Refuel stop at {} after {:.1} mi", station, to_station);
            stops.push(AugmentedStop {
                waypoint: station.clone(),
                is_refuel_stop: true,
                fuel_level_after_percent: 100.0,
                distance_from_previous_miles: Some(to_station),
            });
            refuels += 1;
            inserted_on_leg += 1;
            origin = station;
        }
    }

    info!(
        "Fuel pass: {:.1} mi, {} refuel stop(s), {} warning(s)",
        state.total_miles,
        refuels,
        warnings.len()
    );
    Ok(AugmentedRoute {
        stops,
        total_distance_miles: state.total_miles,
        refuel_stops_added: refuels,
        warnings,
    })
}

fn arrival(destination: &Waypoint, state: &FuelState, leg_miles: f64) -> AugmentedStop {
    AugmentedStop {
        waypoint: destination.clone(),
        is_refuel_stop: false,
        fuel_level_after_percent: state.level_percent(),
        distance_from_previous_miles: Some(leg_miles),
    }
}

/// Leg length from the provider, else the great-circle distance, else zero.
async fn measure_leg(
    services: &FuelServices<'_>,
    origin: &Waypoint,
    destination: &Waypoint,
    mode: TravelMode,
    warnings: &mut Vec<String>,
) -> f64 {
    match services.legs.leg_miles(origin, destination, mode).await {
        Ok(miles) if miles.is_finite() && miles >= 0.0 => return miles,
        Ok(miles) => warn!("Leg {} -> {} reported {} mi", origin, destination, miles),
        Err(e) => debug!("Leg distance {} -> {} failed: {}", origin, destination, e),
    }

    match (
        resolve(services.geocoder, origin).await,
        resolve(services.geocoder, destination).await,
    ) {
        (Ok(a), Ok(b)) => haversine_miles(a, b),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Cannot measure {} -> {}: {}", origin, destination, e);
            warnings.push(format!(
                "Could not measure the leg {origin} -> {destination}; counted as 0 miles."
            ));
            0.0
        }
    }
}

/// Whether the current tank covers `total_miles`.
pub fn can_complete_without_refuel(total_miles: f64, fuel: &FuelConfig) -> bool {
    total_miles <= fuel.current_range_miles()
}

/// Rough refuel count: each fill is good for the range above the threshold.
pub fn estimate_refuel_stops(total_miles: f64, fuel: &FuelConfig) -> usize {
    let initial = fuel.current_range_miles();
    if total_miles <= initial {
        return 0;
    }
    let per_fill = fuel.full_range_miles() * (1.0 - fuel.refuel_threshold_percent / 100.0);
    ((total_miles - initial) / per_fill.max(1.0)).ceil() as usize
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rstest::rstest;

    use super::*;
    use crate::domain::types::LatLng;
    use crate::error::ProviderError;
    use crate::services::{NoGeocoder, PlaceCandidate};

    /// Leg lengths looked up by exact waypoint pair.
    #[derive(Default)]
    pub struct ScriptedLegs(pub Vec<(Waypoint, Waypoint, f64)>);

    #[async_trait]
    impl LegDistanceProvider for ScriptedLegs {
        async fn leg_miles(&self, a: &Waypoint, b: &Waypoint, _: TravelMode) -> Result<f64, ProviderError> {
            self.0
                .iter()
                .find(|(x, y, _)| x == a && y == b)
                .map(|(_, _, miles)| *miles)
                .ok_or_else(|| ProviderError::MalformedResponse(format!("no script for {a} -> {b}")))
        }
    }

    pub struct StraightLines(pub Option<Vec<LatLng>>);

    #[async_trait]
    impl RouteGeometryProvider for StraightLines {
        async fn route_path(&self, _: &Waypoint, _: &Waypoint, _: TravelMode) -> Result<Option<Vec<LatLng>>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    type Rule = Box<dyn Fn(usize, f64) -> bool + Send + Sync>;

    /// Answers with one station whenever `rule(call_index, radius)` holds.
    pub struct ScriptedPlaces {
        station: LatLng,
        rule: Rule,
        calls: Mutex<Vec<(LatLng, f64)>>,
    }

    impl ScriptedPlaces {
        pub fn within(min_radius: f64, station: LatLng) -> Self {
            Self::new(station, Box::new(move |_, r| r >= min_radius))
        }

        pub fn on_call(n: usize, station: LatLng) -> Self {
            Self::new(station, Box::new(move |i, _| i == n))
        }

        pub fn nowhere() -> Self {
            Self::new(LatLng::new(0.0, 0.0), Box::new(|_, _| false))
        }

        fn new(station: LatLng, rule: Rule) -> Self {
            Self {
                station,
                rule,
                calls: Mutex::new(vec![]),
            }
        }

        pub fn radii(&self) -> Vec<f64> {
            self.calls.lock().unwrap().iter().map(|(_, r)| *r).collect()
        }
    }

    #[async_trait]
    impl PointOfInterestLocator for ScriptedPlaces {
        async fn nearby(&self, location: LatLng, radius: f64, _: &str) -> Result<Vec<PlaceCandidate>, ProviderError> {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.len();
            calls.push((location, radius));
            if (self.rule)(index, radius) {
                Ok(vec![PlaceCandidate::at(self.station)])
            } else {
                Ok(vec![])
            }
        }
    }

    /// Every leg is `miles` long, wherever it runs.
    pub struct EveryLeg(pub f64);

    #[async_trait]
    impl LegDistanceProvider for EveryLeg {
        async fn leg_miles(&self, _: &Waypoint, _: &Waypoint, _: TravelMode) -> Result<f64, ProviderError> {
            Ok(self.0)
        }
    }

    /// A straight two-point path between coordinate waypoints.
    pub struct Beeline;

    #[async_trait]
    impl RouteGeometryProvider for Beeline {
        async fn route_path(&self, a: &Waypoint, b: &Waypoint, _: TravelMode) -> Result<Option<Vec<LatLng>>, ProviderError> {
            Ok(a.coord().zip(b.coord()).map(|(a, b)| vec![a, b]))
        }
    }

    /// A station wherever the search is centred.
    pub struct StationsEverywhere;

    #[async_trait]
    impl PointOfInterestLocator for StationsEverywhere {
        async fn nearby(&self, location: LatLng, _: f64, _: &str) -> Result<Vec<PlaceCandidate>, ProviderError> {
            Ok(vec![PlaceCandidate::at(location)])
        }
    }

    fn fuel(current: f64) -> FuelConfig {
        FuelConfig {
            current_fuel_percent: current,
            tank_capacity_gallons: 10.0,
            mpg: 30.0,
            refuel_threshold_percent: 25.0,
        }
    }

    fn a() -> Waypoint {
        Waypoint::Coord(LatLng::new(40.0, -100.0))
    }

    fn b() -> Waypoint {
        Waypoint::Coord(LatLng::new(40.0, -90.0))
    }

    fn station() -> LatLng {
        LatLng::new(40.0, -94.5)
    }

    #[tokio::test]
    async fn one_stop_on_a_500_mile_leg() {
        let s = Waypoint::Coord(station());
        let legs = ScriptedLegs(vec![(a(), b(), 500.0), (a(), s.clone(), 280.0), (s.clone(), b(), 220.0)]);
        let places = ScriptedPlaces::within(0.0, station());
        let services = FuelServices {
            legs: &legs,
            geometry: &StraightLines(None),
            places: &places,
            geocoder: &NoGeocoder,
        };

        let route = add_refuel_stops(&services, &[a(), b()], &fuel(100.0), TravelMode::Driving)
            .await
            .unwrap();

        assert_eq!(route.refuel_stops_added, 1);
        assert_eq!(route.waypoints(), vec![a(), s, b()]);
        assert!(route.stops[1].is_refuel_stop);
        assert_eq!(route.stops[1].fuel_level_after_percent, 100.0);
        let expected = (300.0 - 220.0) / 300.0 * 100.0;
        assert!((route.stops[2].fuel_level_after_percent - expected).abs() < 1e-9);
        assert_eq!(route.total_distance_miles, 500.0);
        assert!(route.warnings.is_empty());
    }

    #[tokio::test]
    async fn station_search_follows_route_geometry() {
        let s = Waypoint::Coord(station());
        let legs = ScriptedLegs(vec![(a(), b(), 500.0), (a(), s.clone(), 280.0), (s.clone(), b(), 220.0)]);
        let places = ScriptedPlaces::within(0.0, station());
        let path = vec![LatLng::new(40.0, -100.0), LatLng::new(40.0, -90.0)];
        let geometry = StraightLines(Some(path));
        let services = FuelServices {
            legs: &legs,
            geometry: &geometry,
            places: &places,
            geocoder: &NoGeocoder,
        };

        add_refuel_stops(&services, &[a(), b()], &fuel(100.0), TravelMode::Driving)
            .await
            .unwrap();

        // target = 300 - (75 + 30) = 195 mi from the origin along the path
        let centre = places.calls.lock().unwrap()[0].0;
        let along = haversine_miles(LatLng::new(40.0, -100.0), centre);
        assert!((along - 195.0).abs() < 1.0, "search centred {along} mi out");
    }

    #[tokio::test]
    async fn comfortable_routes_are_left_alone() {
        let c = Waypoint::Coord(LatLng::new(41.0, -95.0));
        let legs = ScriptedLegs(vec![(a(), c.clone(), 60.0), (c.clone(), b(), 70.0)]);
        let places = ScriptedPlaces::nowhere();
        let services = FuelServices {
            legs: &legs,
            geometry: &StraightLines(None),
            places: &places,
            geocoder: &NoGeocoder,
        };

        let route = add_refuel_stops(&services, &[a(), c.clone(), b()], &fuel(100.0), TravelMode::Driving)
            .await
            .unwrap();

        assert_eq!(route.refuel_stops_added, 0);
        assert_eq!(route.waypoints(), vec![a(), c, b()]);
        assert!(places.radii().is_empty());
        assert_eq!(route.total_distance_miles, 130.0);
    }

    #[tokio::test]
    async fn no_station_means_a_warning_and_an_empty_tank() {
        let legs = ScriptedLegs(vec![(a(), b(), 500.0)]);
        let places = ScriptedPlaces::nowhere();
        let services = FuelServices {
            legs: &legs,
            geometry: &StraightLines(None),
            places: &places,
            geocoder: &NoGeocoder,
        };

        let route = add_refuel_stops(&services, &[a(), b()], &fuel(100.0), TravelMode::Driving)
            .await
            .unwrap();

        assert_eq!(route.refuel_stops_added, 0);
        assert_eq!(route.stops.len(), 2);
        assert_eq!(route.stops[1].fuel_level_after_percent, 0.0);
        assert_eq!(route.warnings.len(), 1);
    }

    #[tokio::test]
    async fn leg_longer_than_a_full_tank_gets_several_stops() {
        // ~1000 mi along the equator with 300 mi of range; each fill covers
        // 300 - (75 + 30) = 195 mi before the next station search
        let start = Waypoint::Coord(LatLng::new(0.0, 0.0));
        let end = Waypoint::Coord(LatLng::new(0.0, 14.4731));
        let legs = ScriptedLegs::default();
        let services = FuelServices {
            legs: &legs,
            geometry: &Beeline,
            places: &StationsEverywhere,
            geocoder: &NoGeocoder,
        };

        let route = add_refuel_stops(&services, &[start.clone(), end.clone()], &fuel(100.0), TravelMode::Driving)
            .await
            .unwrap();

        assert_eq!(route.refuel_stops_added, 4);
        assert_eq!(route.stops.len(), 6);
        assert!(route.stops[1..5].iter().all(|s| s.is_refuel_stop));
        assert_eq!(route.stops[0].waypoint, start);
        assert_eq!(route.stops[5].waypoint, end);
        assert!(route.stops.iter().all(|s| s.fuel_level_after_percent >= 25.0));
        assert!((route.total_distance_miles - 1000.0).abs() < 1.0);
        assert!(route.warnings.is_empty());
    }

    #[tokio::test]
    async fn refuel_cap_per_leg_is_enforced() {
        // every hop is as long as the whole leg, so refuelling never helps
        let start = Waypoint::Coord(LatLng::new(0.0, 0.0));
        let end = Waypoint::Coord(LatLng::new(0.0, 40.0));
        let legs = EveryLeg(1000.0);
        let services = FuelServices {
            legs: &legs,
            geometry: &Beeline,
            places: &StationsEverywhere,
            geocoder: &NoGeocoder,
        };

        let route = add_refuel_stops(&services, &[start, end.clone()], &fuel(100.0), TravelMode::Driving)
            .await
            .unwrap();

        assert_eq!(route.refuel_stops_added, MAX_REFUELS_PER_LEG);
        assert_eq!(route.stops.len(), MAX_REFUELS_PER_LEG + 2);
        assert_eq!(route.stops.last().unwrap().waypoint, end);
        assert_eq!(route.warnings.len(), 1);
        assert!(route.warnings[0].starts_with("Stopped adding refuel stops after 8"));
    }

    #[tokio::test]
    async fn station_at_the_current_stop_is_not_reused() {
        let s = Waypoint::Coord(station());
        let legs = ScriptedLegs(vec![(a(), b(), 500.0), (a(), s.clone(), 280.0), (s.clone(), b(), 500.0)]);
        let places = ScriptedPlaces::within(0.0, station());
        let services = FuelServices {
            legs: &legs,
            geometry: &StraightLines(None),
            places: &places,
            geocoder: &NoGeocoder,
        };

        let route = add_refuel_stops(&services, &[a(), b()], &fuel(100.0), TravelMode::Driving)
            .await
            .unwrap();

        assert_eq!(route.refuel_stops_added, 1);
        assert_eq!(route.waypoints(), vec![a(), s, b()]);
        assert_eq!(route.stops[2].fuel_level_after_percent, 0.0);
        assert_eq!(route.warnings.len(), 1);
        assert!(route.warnings[0].starts_with("No gas station found"));
    }

    #[tokio::test]
    async fn failed_leg_lookup_falls_back_to_great_circle() {
        let legs = ScriptedLegs::default();
        let places = ScriptedPlaces::nowhere();
        let services = FuelServices {
            legs: &legs,
            geometry: &StraightLines(None),
            places: &places,
            geocoder: &NoGeocoder,
        };
        let c = Waypoint::Coord(LatLng::new(40.5, -100.0));

        let route = add_refuel_stops(&services, &[a(), c], &fuel(100.0), TravelMode::Driving)
            .await
            .unwrap();

        let miles = route.stops[1].distance_from_previous_miles.unwrap();
        assert!((miles - 34.55).abs() < 0.1, "got {miles}");
        assert!(route.warnings.is_empty());
    }

    #[rstest]
    #[case(TravelMode::Walking)]
    #[case(TravelMode::Bicycling)]
    #[case(TravelMode::Transit)]
    #[tokio::test]
    async fn only_driving_burns_fuel(#[case] mode: TravelMode) {
        let legs = ScriptedLegs(vec![(a(), b(), 5000.0)]);
        let places = ScriptedPlaces::nowhere();
        let services = FuelServices {
            legs: &legs,
            geometry: &StraightLines(None),
            places: &places,
            geocoder: &NoGeocoder,
        };

        let route = add_refuel_stops(&services, &[a(), b()], &fuel(40.0), mode)
            .await
            .unwrap();

        assert_eq!(route.waypoints(), vec![a(), b()]);
        assert_eq!(route.warnings.len(), 1);
        assert!(route.stops.iter().all(|s| s.fuel_level_after_percent == 40.0));
    }

    #[rstest]
    #[case(FuelConfig { mpg: 0.0, ..fuel(50.0) })]
    #[case(FuelConfig { tank_capacity_gallons: -1.0, ..fuel(50.0) })]
    #[case(fuel(120.0))]
    #[case(FuelConfig { refuel_threshold_percent: -5.0, ..fuel(50.0) })]
    fn rejects_bad_fuel_config(#[case] cfg: FuelConfig) {
        assert!(matches!(cfg.validate(), Err(RouteError::InvalidFuelConfig(_))));
    }

    #[rstest]
    #[case(100.0, 0)]
    #[case(150.0, 0)]
    #[case(151.0, 1)]
    #[case(375.0, 1)]
    #[case(376.0, 2)]
    fn estimates_refuel_count(#[case] miles: f64, #[case] expected: usize) {
        // 50% of 300 mi leaves 150; each fill is good for 225
        assert_eq!(estimate_refuel_stops(miles, &fuel(50.0)), expected);
        assert_eq!(can_complete_without_refuel(miles, &fuel(50.0)), expected == 0);
    }
}
