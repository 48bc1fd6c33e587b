//! Database layer.
//!
//! This module provides the pool core:
//! - Backend seam traits and the sqlx MySQL implementation
//! - Pool registry keyed by connection fingerprint
//! - Query and transaction execution
//! - Type mappings and parameter binding
//! - Ad-hoc single connections

pub mod backend;
pub mod connection;
pub mod executor;
pub mod mysql;
pub mod params;
pub mod registry;
pub mod types;

pub use backend::{PoolConnector, PoolHandle, PooledConnection};
pub use connection::{close_connection, open_connection};
pub use executor::QueryExecutor;
pub use mysql::{MySqlConnector, MySqlPoolHandle, MySqlPooledConnection, ServerFlavor};
pub use registry::{PoolRegistry, global_registry};
