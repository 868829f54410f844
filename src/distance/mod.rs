pub mod matrix;
pub mod providers;

pub use matrix::{build_provider, create_matrices, CostMatrixProvider, MatrixSet, TravelMatrices};
