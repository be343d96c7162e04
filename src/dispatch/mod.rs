//! Command dispatch against a single node

pub mod batch;
pub mod executor;

pub use batch::BatchExecutor;
pub use executor::CommandExecutor;
