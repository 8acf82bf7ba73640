pub mod context;

pub use context::{ContextError, ContextResult, ResolutionDetails};
