use tracing::{debug, info, span, trace, warn, Level};

use crate::config::constant::MAX_LOCAL_SEARCH_PASSES;
use crate::domain::solution::RouteOrder;
use crate::domain::types::{Precedence, RouteConfig};
use crate::evaluation::cost::{route_cost, violates_constraints};
use crate::solver::constructive::nearest_neighbour_constrained;

use super::neighbourhood::first_improvement;

/// Result of a local search run, with the cost after every accepted move.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub order: Vec<usize>,
    pub cost: f64,
    pub passes: usize,
    pub cost_trace: Vec<f64>,
}

/// First-improvement 2-opt + relocate, stopping at a local optimum or after
/// [`MAX_LOCAL_SEARCH_PASSES`] accepted moves.
pub(crate) fn local_search(
    initial: Vec<usize>,
    dm: &[Vec<f64>],
    cfg: &RouteConfig,
    precedence: &Precedence,
) -> SearchOutcome {
    let mut order = initial;
    let mut cost = route_cost(&order, dm, cfg.round_trip);
    let mut cost_trace = vec![cost];
    let mut passes = 0;

    while passes < MAX_LOCAL_SEARCH_PASSES {
        let pass_span = span!(Level::DEBUG, "pass", pass = passes + 1);
        let _guard = pass_span.enter();

        let Some(improvement) = first_improvement(&order, dm, cfg, precedence) else {
            debug!("No improving move left after {} passes", passes);
            break;
        };
        trace!(
            "{:?}: {:.3} -> {:.3}",
            improvement.kind,
            cost,
            improvement.cost
        );
        order = improvement.order;
        cost = improvement.cost;
        cost_trace.push(cost);
        passes += 1;
    }

    if passes == MAX_LOCAL_SEARCH_PASSES {
        debug!("Local search stopped at the pass cap ({})", passes);
    }

    SearchOutcome {
        order,
        cost,
        passes,
        cost_trace,
    }
}

/// Identity permutation rotated to start at `start`, with the fixed finish
/// (if any) moved to the end.
pub fn fallback_order(n: usize, cfg: &RouteConfig) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).map(|i| (cfg.start_index + i) % n).collect();
    if let Some(end) = cfg.fixed_end() {
        order.retain(|&x| x != end);
        order.push(end);
    }
    order
}

/// Constrained nearest neighbour followed by local search.
///
/// If construction could not satisfy the constraints, the search starts
/// from [`fallback_order`] instead.
pub(crate) fn best_order_constrained(
    dm: &[Vec<f64>],
    cfg: &RouteConfig,
    precedence: &Precedence,
) -> RouteOrder {
    let n = dm.len();
    let mut initial = nearest_neighbour_constrained(dm, cfg, precedence);

    if violates_constraints(&initial, precedence, cfg) {
        warn!(
            "Constructed order {:?} breaks the constraints; restarting from the rotated identity",
            initial
        );
        initial = fallback_order(n, cfg);
    }

    let outcome = local_search(initial, dm, cfg, precedence);
    info!(
        "Local search finished after {} passes with cost {:.2}",
        outcome.passes, outcome.cost
    );

    RouteOrder {
        order: outcome.order,
        total_cost: outcome.cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::cost::{is_permutation, violates_precedence};
    use rstest::rstest;

    // Unit square: 0 (0,0), 1 (1,0), 2 (1,1), 3 (0,1); diagonals cost 10.
    fn square() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 1.0, 10.0, 1.0],
            vec![1.0, 0.0, 1.0, 10.0],
            vec![10.0, 1.0, 0.0, 1.0],
            vec![1.0, 10.0, 1.0, 0.0],
        ]
    }

    #[test]
    fn finds_the_optimal_square_tour() {
        let result = best_order_constrained(&square(), &RouteConfig::round_trip(0), &Precedence::new());
        assert_eq!(result.total_cost, 4.0);
        assert!(is_permutation(&result.order, 4));
        assert_eq!(result.order[0], 0);
    }

    #[test]
    fn repairs_a_crossed_tour() {
        let outcome = local_search(vec![0, 2, 1, 3], &square(), &RouteConfig::round_trip(0), &Precedence::new());
        assert_eq!(outcome.cost, 4.0);
        assert!(outcome.passes >= 1);
    }

    #[test]
    fn cost_never_increases_between_passes() {
        let dm: Vec<Vec<f64>> = (0..8)
            .map(|i| {
                (0..8)
                    .map(|j| if i == j { 0.0 } else { ((i * 7 + j * 3) % 11 + 1) as f64 })
                    .collect()
            })
            .collect();
        let outcome = local_search(
            (0..8).collect(),
            &dm,
            &RouteConfig::round_trip(0),
            &Precedence::new(),
        );
        for pair in outcome.cost_trace.windows(2) {
            assert!(pair[1] + 1e-6 < pair[0]);
        }
        assert_eq!(outcome.cost_trace.len(), outcome.passes + 1);
        assert!(outcome.passes <= MAX_LOCAL_SEARCH_PASSES);
    }

    #[test]
    fn keeps_precedence() {
        let precedence = Precedence::from([(2, vec![1])]);
        let dm = vec![
            vec![0.0, 5.0, 1.0, 2.0],
            vec![5.0, 0.0, 1.0, 1.0],
            vec![1.0, 1.0, 0.0, 5.0],
            vec![2.0, 1.0, 5.0, 0.0],
        ];
        let result = best_order_constrained(&dm, &RouteConfig::open(0), &precedence);
        let pos = |x| result.order.iter().position(|&n| n == x).unwrap();
        assert!(pos(1) < pos(2));
        assert!(!violates_precedence(&result.order, &precedence));
    }

    #[rstest]
    #[case(0)]
    #[case(2)]
    #[case(4)]
    fn fixed_finish_stays_last(#[case] end: usize) {
        let dm: Vec<Vec<f64>> = (0..5)
            .map(|i: i32| (0..5).map(|j: i32| (i - j).abs() as f64).collect())
            .collect();
        let cfg = RouteConfig::open(1).with_end(end).validated(5).unwrap();
        let result = best_order_constrained(&dm, &cfg, &Precedence::new());
        assert!(is_permutation(&result.order, 5));
        assert_eq!(result.order[0], 1);
        assert_eq!(*result.order.last().unwrap(), end);
    }

    #[test]
    fn fallback_rotates_and_pins_the_finish() {
        assert_eq!(fallback_order(5, &RouteConfig::open(2)), vec![2, 3, 4, 0, 1]);
        assert_eq!(
            fallback_order(5, &RouteConfig::open(2).with_end(3)),
            vec![2, 4, 0, 1, 3]
        );
    }

    #[test]
    fn contradictory_precedence_still_returns_a_route() {
        let precedence = Precedence::from([(1, vec![2]), (2, vec![1])]);
        let result = best_order_constrained(&square(), &RouteConfig::open(0), &precedence);
        assert!(is_permutation(&result.order, 4));
        assert!(result.total_cost.is_finite());
    }

    #[test]
    fn repeated_runs_agree() {
        let precedence = Precedence::from([(3, vec![1])]);
        let cfg = RouteConfig::open(0);
        let a = best_order_constrained(&square(), &cfg, &precedence);
        let b = best_order_constrained(&square(), &cfg, &precedence);
        assert_eq!(a, b);
    }
}
