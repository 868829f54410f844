use crate::domain::types::{Precedence, RouteConfig};

/// Sum of leg costs along `order`, closing the loop when `round_trip` is set.
/// Any missing edge makes the whole route `f64::INFINITY`.
pub fn route_cost(order: &[usize], dm: &[Vec<f64>], round_trip: bool) -> f64 {
    if order.is_empty() {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..order.len() - 1 {
        total += dist_between(order[i], order[i + 1], dm);
    }
    if round_trip {
        total += dist_between(order[order.len() - 1], order[0], dm);
    }
    total
}

pub fn dist_between(from_loc: usize, to_loc: usize, dm: &[Vec<f64>]) -> f64 {
    dm[from_loc][to_loc]
}

/// True when `order` breaks the fixed start, the fixed finish, or any
/// precedence pair whose two ends are both present.
pub fn violates_constraints(order: &[usize], precedence: &Precedence, cfg: &RouteConfig) -> bool {
    if order.is_empty() {
        return false;
    }
    if order[0] != cfg.start_index {
        return true;
    }
    if let Some(end) = cfg.fixed_end() {
        if order[order.len() - 1] != end {
            return true;
        }
    }
    violates_precedence(order, precedence)
}

pub fn violates_precedence(order: &[usize], precedence: &Precedence) -> bool {
    if precedence.is_empty() {
        return false;
    }
    let pos = positions(order);
    precedence.iter().any(|(&after, befores)| {
        let Some(after_pos) = lookup(&pos, after) else {
            return false;
        };
        befores
            .iter()
            .filter_map(|&b| lookup(&pos, b))
            .any(|before_pos| before_pos >= after_pos)
    })
}

/// `positions(order)[node] == Some(i)` when `order[i] == node`.
pub fn positions(order: &[usize]) -> Vec<Option<usize>> {
    let len = order.iter().copied().max().map_or(0, |m| m + 1);
    let mut pos = vec![None; len];
    for (i, &node) in order.iter().enumerate() {
        pos[node] = Some(i);
    }
    pos
}

fn lookup(pos: &[Option<usize>], node: usize) -> Option<usize> {
    pos.get(node).copied().flatten()
}

pub fn is_permutation(order: &[usize], n: usize) -> bool {
    if order.len() != n {
        return false;
    }
    let mut seen = vec![false; n];
    for &node in order {
        if node >= n || seen[node] {
            return false;
        }
        seen[node] = true;
    }
    true
}
