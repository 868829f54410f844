pub mod fixed;
mod google;
mod osrm;

pub use fixed::FixedMatrixProvider;
