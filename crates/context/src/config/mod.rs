pub mod context_config;
pub mod resolver;
pub mod validation;

pub use context_config::*;
pub use resolver::*;
pub use validation::*;
