use tracing::{debug, trace, warn};

use crate::domain::types::{Precedence, RouteConfig};

/// Greedy nearest-neighbour order that respects precedence where it can.
///
/// The fixed finish is held back until it is the only node left. When no
/// unvisited node has all its prerequisites met (cyclic or contradictory
/// precedence) the pool relaxes to every unvisited node, so the result may
/// still break precedence. Ties go to the smallest index, and an infinite
/// edge is taken rather than stopping early.
pub(crate) fn nearest_neighbour_constrained(
    dm: &[Vec<f64>],
    cfg: &RouteConfig,
    precedence: &Precedence,
) -> Vec<usize> {
    let n = dm.len();
    if n == 0 {
        return vec![];
    }

    let start = cfg.start_index;
    let fixed_end = cfg.fixed_end().filter(|&end| end != start);

    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    order.push(start);
    visited[start] = true;

    while order.len() < n {
        let last = order[order.len() - 1];
        let reserved = |j: usize, placed: usize| fixed_end == Some(j) && placed < n - 1;

        let ready: Vec<usize> = (0..n)
            .filter(|&j| !visited[j] && !reserved(j, order.len()))
            .filter(|j| {
                precedence
                    .get(j)
                    .map_or(true, |reqs| reqs.iter().all(|&r| r >= n || visited[r]))
            })
            .collect();

        let pool = if ready.is_empty() {
            let relaxed: Vec<usize> = (0..n)
                .filter(|&j| !visited[j] && !reserved(j, order.len()))
                .collect();
            if !relaxed.is_empty() {
                warn!(
                    "No node has its prerequisites met after {:?}; relaxing precedence",
                    order
                );
            }
            relaxed
        } else {
            ready
        };

        // Only the reserved finish is left; it is appended below.
        let Some(next) = cheapest_from(last, &pool, dm) else {
            break;
        };
        trace!("nearest neighbour: {} -> {} ({})", last, next, dm[last][next]);
        order.push(next);
        visited[next] = true;
    }

    if let Some(end) = fixed_end {
        if !visited[end] {
            order.push(end);
        }
    }

    debug!("Constructed order: {:?}", order);
    order
}

fn cheapest_from(from: usize, pool: &[usize], dm: &[Vec<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for &j in pool {
        let cost = dm[from][j];
        match best {
            Some((_, best_cost)) if cost >= best_cost => {}
            _ => best = Some((j, cost)),
        }
    }
    best.map(|(j, _)| j)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::cost::is_permutation;

    const INF: f64 = f64::INFINITY;

    fn square() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 1.0, 2.0, 1.0],
            vec![1.0, 0.0, 1.0, 2.0],
            vec![2.0, 1.0, 0.0, 1.0],
            vec![1.0, 2.0, 1.0, 0.0],
        ]
    }

    #[test]
    fn ties_go_to_the_smallest_index() {
        let order = nearest_neighbour_constrained(&square(), &RouteConfig::open(0), &Precedence::new());
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn starts_at_the_fixed_start() {
        let order = nearest_neighbour_constrained(&square(), &RouteConfig::open(2), &Precedence::new());
        assert_eq!(order[0], 2);
        assert!(is_permutation(&order, 4));
    }

    #[test]
    fn holds_back_the_fixed_finish() {
        let cfg = RouteConfig::open(0).with_end(1);
        let order = nearest_neighbour_constrained(&square(), &cfg, &Precedence::new());
        assert_eq!(order, vec![0, 3, 2, 1]);
    }

    #[test]
    fn waits_for_prerequisites() {
        let precedence = Precedence::from([(1, vec![2])]);
        let order = nearest_neighbour_constrained(&square(), &RouteConfig::open(0), &precedence);
        let pos = |x| order.iter().position(|&n| n == x).unwrap();
        assert!(pos(2) < pos(1));
    }

    #[test]
    fn cyclic_precedence_still_yields_a_permutation() {
        let precedence = Precedence::from([(1, vec![2]), (2, vec![3]), (3, vec![1])]);
        let order = nearest_neighbour_constrained(&square(), &RouteConfig::open(0), &precedence);
        assert!(is_permutation(&order, 4));
        assert_eq!(order[0], 0);
    }

    #[test]
    fn takes_infinite_edges_instead_of_stopping() {
        let dm = vec![
            vec![0.0, INF, INF],
            vec![INF, 0.0, INF],
            vec![INF, INF, 0.0],
        ];
        let order = nearest_neighbour_constrained(&dm, &RouteConfig::open(0), &Precedence::new());
        assert_eq!(order, vec![0, 1, 2]);
    }
}
