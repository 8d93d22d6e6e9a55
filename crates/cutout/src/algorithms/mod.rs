pub mod geometry;
pub mod extraction;
pub mod brush;
pub mod fill;

pub use geometry::*;
pub use extraction::*;
pub use brush::*;
pub use fill::*;
