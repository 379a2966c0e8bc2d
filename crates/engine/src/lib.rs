//! `engine` crate: action-tree validation, the tree executor, and the
//! continuation job that resumes scheduled subtrees.

pub mod config;
pub mod continuation;
pub mod error;
pub mod executor;
pub mod registry;
pub mod validate;

pub use config::EngineConfig;
pub use continuation::ContinuationJob;
pub use error::EngineError;
pub use executor::TreeExecutor;
pub use registry::ActivityRegistry;
pub use validate::validate_tree;

#[cfg(test)]
mod executor_tests;
