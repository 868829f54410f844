use chrono::{DateTime, Duration, Utc};
use tracing::{info, span, warn, Instrument, Level};

use crate::distance::matrix::{create_matrices, CostMatrixProvider, MatrixSet};
use crate::domain::solution::{DepartureOption, DepartureSuggestion, RouteOrder, RouteResult};
use crate::domain::types::{
    MatrixRequest, OptimizeOptions, Precedence, RouteConfig, SolverKind, Strategy, Waypoint,
};
use crate::error::RouteError;
use crate::evaluation::cost::route_cost;
use crate::solver::exact::ucs_best_order;
use crate::solver::local_search::best_order_constrained;

/// Order the waypoints on the matrix selected by `strategy`.
///
/// `cfg` is range-checked against the matrix first. The exact solver refuses
/// precedence constraints and a fixed finish rather than silently dropping
/// them.
pub fn solve_order(
    matrices: &MatrixSet,
    strategy: Strategy,
    solver: SolverKind,
    cfg: &RouteConfig,
    precedence: &Precedence,
) -> Result<RouteOrder, RouteError> {
    let dm = matrices.driving(strategy);
    let cfg = cfg.validated(dm.len())?;
    match solver {
        SolverKind::Heuristic => Ok(best_order_constrained(dm, &cfg, precedence)),
        SolverKind::Exact => {
            if !precedence.is_empty() || cfg.fixed_end().is_some() {
                return Err(RouteError::UnsupportedConstraints);
            }
            ucs_best_order(dm, cfg.start_index, cfg.round_trip)
        }
    }
}

/// Fetch the matrices, order the waypoints and report the result.
///
/// `total_seconds` always comes from the time matrix, whatever the strategy
/// optimised.
pub async fn compute_best_route(
    provider: &dyn CostMatrixProvider,
    waypoints: &[Waypoint],
    options: &OptimizeOptions,
) -> Result<RouteResult, RouteError> {
    let cfg = options.route.validated(waypoints.len())?;

    let request = MatrixRequest {
        waypoints: waypoints.to_vec(),
        mode: options.mode,
        departure_time: options.departure_time,
        avoid_highways: options.avoid_highways,
        avoid_tolls: options.avoid_tolls,
    };
    let matrices = create_matrices(provider, &request, options.strategy)
        .instrument(span!(Level::INFO, "fetch_matrices", n = waypoints.len()))
        .await?;

    let optimize_span = span!(Level::INFO, "optimize", strategy = ?options.strategy);
    let _guard = optimize_span.enter();
    let solved = solve_order(
        &matrices,
        options.strategy,
        options.solver,
        &cfg,
        &options.precedence,
    )?;

    let total_seconds = route_cost(&solved.order, &matrices.travel.time_seconds, cfg.round_trip);
    let total_meters = route_cost(&solved.order, &matrices.travel.distance_meters, cfg.round_trip);
    if !total_seconds.is_finite() {
        warn!("Best order {:?} still uses an unreachable leg", solved.order);
    }
    info!(
        "Best order {:?}: {:.0} s, {:.0} m (optimised cost {:.2})",
        solved.order, total_seconds, total_meters, solved.total_cost
    );

    Ok(RouteResult {
        ordered_waypoints: solved.order.iter().map(|&i| waypoints[i].clone()).collect(),
        order: solved.order,
        strategy: options.strategy,
        optimized_cost: solved.total_cost,
        total_seconds,
        total_meters,
    })
}

/// Re-run [`compute_best_route`] for each departure offset and keep the
/// quickest. Ties go to the earlier offset in the list.
pub async fn suggest_best_departure(
    provider: &dyn CostMatrixProvider,
    waypoints: &[Waypoint],
    offsets_minutes: &[i64],
    base_time: DateTime<Utc>,
    options: &OptimizeOptions,
) -> Result<DepartureSuggestion, RouteError> {
    if offsets_minutes.is_empty() {
        return Err(RouteError::Config("no departure offsets given".to_string()));
    }

    let mut results = Vec::with_capacity(offsets_minutes.len());
    for &offset in offsets_minutes {
        let options = OptimizeOptions {
            departure_time: Some(base_time + Duration::minutes(offset)),
            ..options.clone()
        };
        let route = compute_best_route(provider, waypoints, &options).await?;
        info!("Departure +{} min: {:.0} s", offset, route.total_seconds);
        results.push(DepartureOption {
            offset_minutes: offset,
            total_seconds: route.total_seconds,
            order: route.order,
        });
    }

    let mut best = 0;
    for (i, option) in results.iter().enumerate() {
        if option.total_seconds < results[best].total_seconds {
            best = i;
        }
    }

    Ok(DepartureSuggestion {
        best_offset_minutes: results[best].offset_minutes,
        best_seconds: results[best].total_seconds,
        best_order: results[best].order.clone(),
        results,
    })
}
