pub mod png;
pub mod export;

pub use png::*;
pub use export::*;
