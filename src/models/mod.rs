//! Data models for the pool core.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod response;

// Re-export commonly used types
pub use connection::{ConnectionConfig, PoolKey};
pub use query::{ColumnMetadata, QueryOutput, QueryParam, QueryRequest, Statement};
pub use response::Response;
