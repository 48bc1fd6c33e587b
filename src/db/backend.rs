//! Backend seam between the pool core and the physical driver.
//!
//! The registry and the executors only talk to these traits. Production code
//! plugs in the sqlx MySQL implementation from [`crate::db::mysql`]; tests
//! plug in in-memory fakes.

use crate::config::PoolSettings;
use crate::error::DbResult;
use crate::models::{ConnectionConfig, QueryOutput, QueryParam};
use std::future::Future;
use std::time::Duration;

/// A physical connection borrowed from a pool for one query or one transaction.
///
/// Dropping the value releases it back to its pool. A connection dropped while
/// a transaction is still open must not be handed to another borrower.
pub trait PooledConnection: Send {
    /// Set the server-side execution-time cap for statements on this connection.
    fn set_execution_cap(&mut self, cap: Duration) -> impl Future<Output = DbResult<()>> + Send;

    /// Run one statement with positional parameters bound.
    fn run(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> impl Future<Output = DbResult<QueryOutput>> + Send;

    fn begin(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = DbResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = DbResult<()>> + Send;
}

/// A bounded set of physical connections.
pub trait PoolHandle: Send + Sync + 'static {
    type Connection: PooledConnection;

    /// Borrow a connection, waiting up to the acquire timeout.
    fn acquire(&self) -> impl Future<Output = DbResult<Self::Connection>> + Send;

    /// Liveness probe, bounded by the connect timeout.
    fn ping(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Gracefully close every physical connection.
    fn close(&self) -> impl Future<Output = DbResult<()>> + Send;

    fn settings(&self) -> &PoolSettings;
}

/// Builds pool handles for the registry.
pub trait PoolConnector: Send + Sync + 'static {
    type Pool: PoolHandle;

    fn create_pool(
        &self,
        config: &ConnectionConfig,
        settings: &PoolSettings,
    ) -> impl Future<Output = DbResult<Self::Pool>> + Send;
}
