use crate::config::constant::IMPROVEMENT_EPSILON;
use crate::domain::types::{Precedence, RouteConfig};
use crate::evaluation::cost::{route_cost, violates_constraints};

/// An accepted move: the new order and its cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Improvement {
    pub order: Vec<usize>,
    pub cost: f64,
    pub kind: MoveKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    TwoOpt { i: usize, k: usize },
    Relocate { from: usize, to: usize },
}

/// Scans 2-opt moves, then relocate moves, and returns the first candidate
/// that keeps every constraint and beats `current` by more than the epsilon.
pub fn first_improvement(
    order: &[usize],
    dm: &[Vec<f64>],
    cfg: &RouteConfig,
    precedence: &Precedence,
) -> Option<Improvement> {
    let current = route_cost(order, dm, cfg.round_trip);
    try_two_opt(order, current, dm, cfg, precedence)
        .or_else(|| try_relocate(order, current, dm, cfg, precedence))
}

/// Reverses `order[i..=k]` for `1 <= i < k`; the last position stays put on
/// open paths.
pub fn try_two_opt(
    order: &[usize],
    current: f64,
    dm: &[Vec<f64>],
    cfg: &RouteConfig,
    precedence: &Precedence,
) -> Option<Improvement> {
    let n = order.len();
    let k_limit = if cfg.round_trip { n } else { n.saturating_sub(1) };

    for i in 1..n.saturating_sub(2) {
        for k in (i + 1)..k_limit {
            let mut cand = order.to_vec();
            cand[i..=k].reverse();

            if let Some(cost) = accept(&cand, current, dm, cfg, precedence) {
                return Some(Improvement {
                    order: cand,
                    cost,
                    kind: MoveKind::TwoOpt { i, k },
                });
            }
        }
    }
    None
}

/// Moves the node at position `k` so that it lands before the node that sat
/// at position `j`. Position 0 is never vacated or targeted; on open paths
/// the last node stays last.
pub fn try_relocate(
    order: &[usize],
    current: f64,
    dm: &[Vec<f64>],
    cfg: &RouteConfig,
    precedence: &Precedence,
) -> Option<Improvement> {
    let n = order.len();
    let tail = if cfg.round_trip { n } else { n.saturating_sub(1) };

    for k in 1..tail {
        for j in 1..=tail {
            if j == k || j == k + 1 {
                continue;
            }
            let mut cand = order.to_vec();
            let node = cand.remove(k);
            let insert_at = if j > k { j - 1 } else { j };
            cand.insert(insert_at, node);

            if let Some(cost) = accept(&cand, current, dm, cfg, precedence) {
                return Some(Improvement {
                    order: cand,
                    cost,
                    kind: MoveKind::Relocate { from: k, to: j },
                });
            }
        }
    }
    None
}

fn accept(
    cand: &[usize],
    current: f64,
    dm: &[Vec<f64>],
    cfg: &RouteConfig,
    precedence: &Precedence,
) -> Option<f64> {
    if violates_constraints(cand, precedence, cfg) {
        return None;
    }
    let cost = route_cost(cand, dm, cfg.round_trip);
    (cost + IMPROVEMENT_EPSILON < current).then_some(cost)
}
