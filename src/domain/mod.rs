pub mod grid;
pub mod relay;

pub use grid::*;
pub use relay::*;
