//! `queue` crate: job envelope, handler registry and the polling worker
//! that delivers scheduled continuations.

pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod memory;
pub mod source;
pub mod worker;

pub use config::WorkerConfig;
pub use error::QueueError;
pub use handler::{HandlerRegistry, JobHandler};
pub use job::{FailOutcome, Job};
pub use memory::InMemoryScheduler;
pub use source::{lease_cutoff, JobSource, DEFAULT_LEASE};
pub use worker::{PollStats, Worker};
