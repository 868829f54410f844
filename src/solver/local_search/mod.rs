pub mod neighbourhood;
pub mod search;

pub use neighbourhood::*;
pub use search::*;
