//! Command-line driver: reads a trip from the environment, optimises it and
//! prints the result.

use std::env;
use std::error::Error;
use std::str::FromStr;

use chrono::Utc;
use colored::*;
use csv::{ReaderBuilder, Writer};
use dotenv::dotenv;
use tracing::{info, span, warn, Instrument, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::api::google_api::GoogleMapsClient;
use crate::config::constant::METERS_PER_MILE;
use crate::config::Settings;
use crate::distance::matrix::build_provider;
use crate::domain::solution::{AugmentedRoute, DepartureSuggestion, RouteResult};
use crate::domain::types::{LatLng, OptimizeOptions, Precedence, RouteConfig, Waypoint};
use crate::error::RouteError;
use crate::fuel::{add_refuel_stops, can_complete_without_refuel, estimate_refuel_stops};
use crate::fuel::{FuelConfig, FuelServices};
use crate::solver::strategy::{compute_best_route, suggest_best_departure};

fn init_tracing_and_env() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            fmt::layer()
                .with_span_events(fmt::format::FmtSpan::NEW | fmt::format::FmtSpan::CLOSE)
                .pretty(),
        )
        .init();

    dotenv().ok();
    Ok(())
}

/// What to optimise, as given by the environment.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub waypoints_csv: String,
    pub output_csv: Option<String>,
    pub optimize: OptimizeOptions,
    pub fuel: Option<FuelConfig>,
    pub departure_offsets: Vec<i64>,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(name: &str) -> Result<Option<T>, RouteError>
where
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| RouteError::Config(format!("{name}='{raw}': {e}")))
        })
        .transpose()
}

impl RunOptions {
    pub fn from_env() -> Result<Self, RouteError> {
        let waypoints_csv = var("WAYPOINTS_CSV")
            .ok_or_else(|| RouteError::Config("WAYPOINTS_CSV is not set".to_string()))?;

        let start = parsed::<usize>("START_INDEX")?.unwrap_or(0);
        let round_trip = parsed::<bool>("ROUND_TRIP")?.unwrap_or(false);
        let mut route = if round_trip {
            RouteConfig::round_trip(start)
        } else {
            RouteConfig::open(start)
        };
        if let Some(end) = parsed::<usize>("END_INDEX")? {
            route = route.with_end(end);
        }

        let optimize = OptimizeOptions {
            mode: parsed("TRAVEL_MODE")?.unwrap_or_default(),
            strategy: parsed("STRATEGY")?.unwrap_or_default(),
            solver: parsed("SOLVER")?.unwrap_or_default(),
            route,
            precedence: var("PRECEDENCE")
                .map(|raw| parse_precedence(&raw))
                .transpose()?
                .unwrap_or_default(),
            avoid_highways: parsed("AVOID_HIGHWAYS")?.unwrap_or(false),
            avoid_tolls: parsed("AVOID_TOLLS")?.unwrap_or(false),
            departure_time: None,
        };

        let fuel = match (parsed::<f64>("FUEL_TANK_GALLONS")?, parsed::<f64>("FUEL_MPG")?) {
            (Some(tank_capacity_gallons), Some(mpg)) => Some(FuelConfig {
                current_fuel_percent: parsed("FUEL_CURRENT_PERCENT")?.unwrap_or(100.0),
                tank_capacity_gallons,
                mpg,
                refuel_threshold_percent: parsed("FUEL_THRESHOLD_PERCENT")?.unwrap_or(25.0),
            }),
            _ => None,
        };

        let departure_offsets = var("DEPARTURE_OFFSETS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| {
                        s.trim().parse::<i64>().map_err(|e| {
                            RouteError::Config(format!("DEPARTURE_OFFSETS entry '{s}': {e}"))
                        })
                    })
                    .collect::<Result<Vec<i64>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            waypoints_csv,
            output_csv: var("OUTPUT_CSV"),
            optimize,
            fuel,
            departure_offsets,
        })
    }
}

/// `after:before,before;after:before`, e.g. `3:1,2;4:3`.
pub fn parse_precedence(raw: &str) -> Result<Precedence, RouteError> {
    let bad = |part: &str| RouteError::Config(format!("bad PRECEDENCE entry '{part}'"));
    let mut precedence = Precedence::new();
    for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (after, befores) = part.split_once(':').ok_or_else(|| bad(part))?;
        let after = after.trim().parse::<usize>().map_err(|_| bad(part))?;
        for before in befores.split(',').map(str::trim).filter(|b| !b.is_empty()) {
            let before = before.parse::<usize>().map_err(|_| bad(part))?;
            precedence.entry(after).or_default().push(before);
        }
    }
    Ok(precedence)
}

/// One waypoint per row: `lat,lng` becomes a coordinate, anything else an address.
pub fn parse_waypoints<R: std::io::Read>(reader: R) -> Result<Vec<Waypoint>, Box<dyn Error>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut waypoints = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let fields: Vec<&str> = record.iter().filter(|f| !f.is_empty()).collect();
        if fields.is_empty() {
            continue;
        }
        let coord = match fields.as_slice() {
            [lat, lng] => lat.parse::<f64>().ok().zip(lng.parse::<f64>().ok()),
            _ => None,
        };
        waypoints.push(match coord {
            Some((lat, lng)) => Waypoint::Coord(LatLng::new(lat, lng)),
            None => Waypoint::Address(fields.join(", ")),
        });
    }
    Ok(waypoints)
}

pub async fn run() -> Result<(), Box<dyn Error>> {
    init_tracing_and_env()?;

    let settings = Settings::from_env()?;
    let options = RunOptions::from_env()?;

    let waypoints = parse_waypoints(std::fs::File::open(&options.waypoints_csv)?)?;
    info!("Read {} waypoints from {}", waypoints.len(), options.waypoints_csv);

    let provider = build_provider(&settings)?;
    let result = compute_best_route(provider.as_ref(), &waypoints, &options.optimize).await?;
    print_route(&result, options.optimize.route.round_trip);

    if let Some(path) = &options.output_csv {
        save_route_csv(&result, path)?;
        info!("Wrote ordered route to {}", path);
    }

    if !options.departure_offsets.is_empty() {
        let suggestion = suggest_best_departure(
            provider.as_ref(),
            &waypoints,
            &options.departure_offsets,
            Utc::now(),
            &options.optimize,
        )
        .instrument(span!(Level::INFO, "departure_suggestion"))
        .await?;
        print_departures(&suggestion);
    }

    if let Some(fuel) = &options.fuel {
        let Some(key) = settings.google_api_key.as_deref() else {
            warn!("Fuel planning needs GOOGLE_API_KEY for station search; skipping");
            return Ok(());
        };
        let client = GoogleMapsClient::new(key, &settings)?;
        let services = FuelServices::from_client(&client);

        let miles = result.total_meters / METERS_PER_MILE;
        if result.total_meters.is_finite() {
            info!(
                "Route is {:.1} mi; without stops: {}, estimated stops: {}",
                miles,
                can_complete_without_refuel(miles, fuel),
                estimate_refuel_stops(miles, fuel)
            );
        }

        let augmented =
            add_refuel_stops(&services, &result.ordered_waypoints, fuel, options.optimize.mode)
                .instrument(span!(Level::INFO, "fuel"))
                .await?;
        print_fuel(&augmented);
    }

    Ok(())
}

fn save_route_csv(result: &RouteResult, filename: &str) -> Result<(), Box<dyn Error>> {
    let mut wtr = Writer::from_path(filename)?;
    wtr.write_record(["position", "waypoint_index", "waypoint"])?;
    for (position, (index, waypoint)) in result
        .order
        .iter()
        .zip(&result.ordered_waypoints)
        .enumerate()
    {
        wtr.write_record([position.to_string(), index.to_string(), waypoint.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

fn print_route(result: &RouteResult, round_trip: bool) {
    println!("{}", format!("Best route ({:?})", result.strategy).bold());
    for (position, (index, waypoint)) in result
        .order
        .iter()
        .zip(&result.ordered_waypoints)
        .enumerate()
    {
        println!("  {:>2}. [{}] {}", position + 1, index, waypoint);
    }
    if round_trip {
        if let Some(first) = result.ordered_waypoints.first() {
            println!("   -> {}", first);
        }
    }

    if result.total_seconds.is_finite() {
        println!(
            "{}, {}",
            format!("Duration: {:.1} min", result.total_seconds / 60.0).green(),
            format!("Distance: {:.2} km", result.total_meters / 1000.0).green()
        );
    } else {
        println!("{}", "Route uses an unreachable leg".red());
    }
}

fn print_departures(suggestion: &DepartureSuggestion) {
    for option in &suggestion.results {
        let line = format!(
            "  +{:>3} min: {:.1} min {:?}",
            option.offset_minutes,
            option.total_seconds / 60.0,
            option.order
        );
        if option.offset_minutes == suggestion.best_offset_minutes {
            println!("{}", line.green());
        } else {
            println!("{line}");
        }
    }
}

fn print_fuel(route: &AugmentedRoute) {
    println!(
        "{}",
        format!(
            "Fuel plan: {:.1} mi, {} refuel stop(s)",
            route.total_distance_miles, route.refuel_stops_added
        )
        .bold()
    );
    for stop in &route.stops {
        let line = format!("  {} ({:.0}% after)", stop.waypoint, stop.fuel_level_after_percent);
        if stop.is_refuel_stop {
            println!("{}", line.yellow());
        } else {
            println!("{line}");
        }
    }
    for warning in &route.warnings {
        println!("{}", warning.red());
    }
}
