//! `db` crate: Postgres persistence for the durable continuation queue.
//!
//! Provides a connection pool, the typed job row, repository functions for
//! the `continuation_jobs` table, and [`PgJobStore`], which plugs that table
//! into the scheduler and worker seams.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use pool::{create_pool, run_migrations, DbPool};
pub use store::PgJobStore;
