//! `db` crate: Postgres persistence for definitions and instances.
//!
//! Provides a connection pool, typed row structs, repository functions for
//! every table, and [`PgStore`], which implements the engine's store traits
//! on top of them.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

pub use error::DbError;
pub use pool::{create_pool, run_migrations, DbPool};
pub use store::PgStore;
