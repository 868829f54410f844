pub mod geometry;
pub mod stations;
pub mod tracker;

pub use tracker::{
    add_refuel_stops, can_complete_without_refuel, estimate_refuel_stops, FuelConfig, FuelServices,
};
