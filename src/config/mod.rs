/// Configuration management
pub mod constructor;

pub use constructor::*;
