//! Single non-pooled connections.

use crate::db::mysql::{connect_options, connection_suggestion};
use crate::error::{DbError, DbResult};
use crate::models::ConnectionConfig;
use sqlx::Connection;
use sqlx::mysql::MySqlConnection;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Open one connection outside any pool, bounded by `connect_timeout`.
pub async fn open_connection(
    config: &ConnectionConfig,
    connect_timeout: Duration,
) -> DbResult<MySqlConnection> {
    config.validate().map_err(DbError::invalid_input)?;
    let key = config.pool_key();

    match timeout(
        connect_timeout,
        MySqlConnection::connect_with(&connect_options(config)),
    )
    .await
    {
        Ok(Ok(conn)) => {
            debug!(target_db = %key, "Opened ad-hoc connection");
            Ok(conn)
        }
        Ok(Err(e)) => Err(DbError::connection(
            format!("Failed to connect: {}", e),
            connection_suggestion(&e),
        )),
        Err(_) => Err(DbError::timeout(
            "connect",
            connect_timeout.as_millis() as u64,
        )),
    }
}

/// Close a connection gracefully. Failures are logged, not returned.
pub async fn close_connection(conn: MySqlConnection) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close connection");
    } else {
        debug!("Closed ad-hoc connection");
    }
}
