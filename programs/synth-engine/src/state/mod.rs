pub mod engine_config;
pub mod position;

pub use engine_config::*;
pub use position::*;
