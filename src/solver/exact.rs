//! Uniform-cost search over `(node, visited set)` states.
//!
//! Finds the cheapest visiting order from a fixed start for small instances.
//! Precedence constraints and a fixed finish are not modelled here; callers
//! that need them must use the heuristic pipeline.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use tracing::{debug, info, warn};

use crate::config::constant::EXACT_SOLVER_MAX_NODES;
use crate::domain::solution::RouteOrder;
use crate::domain::types::RouteConfig;
use crate::error::RouteError;
use crate::solver::local_search::fallback_order;

#[derive(Debug, Clone)]
struct State {
    cost: f64,
    node: usize,
    visited: u64,
    path: Vec<usize>,
}

// Min-heap on cost; equal costs prefer the lexicographically smaller path so
// the search is deterministic.
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.path.cmp(&self.path))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

/// Globally cheapest order starting at `start`, optionally returning to it.
///
/// The returned order never repeats the start; for round trips the closing
/// leg is included in `total_cost`. When no complete route exists the
/// rotated identity order is returned with an infinite cost.
pub fn ucs_best_order(dm: &[Vec<f64>], start: usize, round_trip: bool) -> Result<RouteOrder, RouteError> {
    let n = dm.len();
    if n == 0 {
        return Err(RouteError::EmptyWaypoints);
    }
    if start >= n {
        return Err(RouteError::IndexOutOfRange {
            name: "start index",
            index: start,
            len: n,
        });
    }
    if n > EXACT_SOLVER_MAX_NODES {
        return Err(RouteError::TooManyNodes {
            solver: "exact solver",
            n,
            max: EXACT_SOLVER_MAX_NODES,
        });
    }

    let goal: u64 = (1u64 << n) - 1;
    let mut best: HashMap<(usize, u64), f64> = HashMap::new();
    let mut queue = BinaryHeap::new();
    let mut expanded = 0usize;

    best.insert((start, 1u64 << start), 0.0);
    queue.push(State {
        cost: 0.0,
        node: start,
        visited: 1u64 << start,
        path: vec![start],
    });

    while let Some(cur) = queue.pop() {
        // A cheaper way into this state was queued after this one.
        if best
            .get(&(cur.node, cur.visited))
            .is_some_and(|&known| cur.cost > known)
        {
            continue;
        }
        expanded += 1;

        if cur.visited == goal {
            if !round_trip || cur.node == start {
                let mut order = cur.path;
                if round_trip && order.len() > 1 {
                    order.pop();
                }
                info!(
                    "Exact solver found cost {:.2} after expanding {} states",
                    cur.cost, expanded
                );
                return Ok(RouteOrder {
                    order,
                    total_cost: cur.cost,
                });
            }

            let back = dm[cur.node][start];
            if back.is_finite() {
                let mut path = cur.path.clone();
                path.push(start);
                relax(&mut best, &mut queue, start, cur.visited, cur.cost + back, path);
            }
            continue;
        }

        for next in 0..n {
            if cur.visited & (1u64 << next) != 0 {
                continue;
            }
            let leg = dm[cur.node][next];
            if !leg.is_finite() {
                continue;
            }
            let mut path = cur.path.clone();
            path.push(next);
            relax(
                &mut best,
                &mut queue,
                next,
                cur.visited | (1u64 << next),
                cur.cost + leg,
                path,
            );
        }
    }

    warn!("Exact solver found no complete route from {}", start);
    let order = fallback_order(n, &RouteConfig::open(start));
    debug!("Returning unreachable fallback order {:?}", order);
    Ok(RouteOrder {
        order,
        total_cost: f64::INFINITY,
    })
}

fn relax(
    best: &mut HashMap<(usize, u64), f64>,
    queue: &mut BinaryHeap<State>,
    node: usize,
    visited: u64,
    cost: f64,
    path: Vec<usize>,
) {
    let key = (node, visited);
    if best.get(&key).map_or(true, |&known| cost < known) {
        best.insert(key, cost);
        queue.push(State {
            cost,
            node,
            visited,
            path,
        });
    }
}
