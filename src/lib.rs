//! DB Master pool core.
//!
//! Connection-pool manager and query-execution layer for the DB Master
//! MySQL/MariaDB administration tool: per-credential pool registry with
//! health-checked reuse, single-query execution and atomic multi-statement
//! transactions with guaranteed connection release.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, PoolOptions, PoolSettings};
pub use db::{PoolRegistry, QueryExecutor, global_registry};
pub use error::{DbError, DbResult};
