pub mod constructive;
pub mod exact;
pub mod local_search;
pub mod strategy;

pub use strategy::{compute_best_route, solve_order, suggest_best_departure};
