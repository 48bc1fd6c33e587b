//! sqlx-backed MySQL/MariaDB implementation of the backend seam.
//!
//! Pools are `MySqlPool`s configured from [`PoolSettings`]. The server flavor
//! (MySQL or MariaDB) is detected once per pool and decides how the
//! execution-time cap is applied to a borrowed connection.

use crate::config::PoolSettings;
use crate::db::backend::{PoolConnector, PoolHandle, PooledConnection};
use crate::db::params::bind_mysql_param;
use crate::db::types::{RowToJson, columns_metadata};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnMetadata, ConnectionConfig, PoolKey, QueryOutput, QueryParam};
use futures_util::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPoolOptions, MySqlSslMode};
use sqlx::pool::PoolConnection;
use sqlx::{Either, Executor, MySql, MySqlPool};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Upper bound for a graceful pool close.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build sqlx connect options from a connection configuration.
///
/// `use_ssl` maps to `MySqlSslMode::Required`: traffic is encrypted but the
/// server certificate is not verified, so self-signed certificates work.
pub fn connect_options(config: &ConnectionConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .database(&config.database)
        .charset("utf8mb4");

    if !config.password.is_empty() {
        options = options.password(&config.password);
    }

    options.ssl_mode(if config.use_ssl {
        MySqlSslMode::Required
    } else {
        MySqlSslMode::Disabled
    })
}

/// Generate a helpful suggestion for connection errors.
pub(crate) fn connection_suggestion(error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return "Check that the MySQL server is running and accessible".to_string();
    }

    if error_str.contains("access denied") || error_str.contains("password") {
        return "Verify the user name and password".to_string();
    }

    if error_str.contains("unknown database") {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check the server's SSL configuration, or build with the tls-native or tls-rustls feature"
            .to_string();
    }

    "Verify host, port, user and database".to_string()
}

/// MySQL or MariaDB, as reported by `SELECT VERSION()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerFlavor {
    MySql,
    MariaDb,
}

impl ServerFlavor {
    pub fn from_version(version: &str) -> Self {
        if version.to_ascii_lowercase().contains("mariadb") {
            Self::MariaDb
        } else {
            Self::MySql
        }
    }

    /// Statement setting the session execution-time cap.
    pub fn execution_cap_sql(self, cap: Duration) -> String {
        match self {
            // milliseconds, applies to SELECT
            Self::MySql => format!("SET SESSION max_execution_time = {}", cap.as_millis()),
            // seconds, fractional allowed
            Self::MariaDb => format!("SET SESSION max_statement_time = {}", cap.as_secs_f64()),
        }
    }
}

/// Connector creating sqlx MySQL pools.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl PoolConnector for MySqlConnector {
    type Pool = MySqlPoolHandle;

    async fn create_pool(
        &self,
        config: &ConnectionConfig,
        settings: &PoolSettings,
    ) -> DbResult<MySqlPoolHandle> {
        config.validate().map_err(DbError::invalid_input)?;

        let key = config.pool_key();
        let hook_key = key.clone();

        let connect = MySqlPoolOptions::new()
            .min_connections(0)
            .max_connections(settings.connection_limit)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(Some(settings.idle_timeout))
            .test_before_acquire(settings.keep_alive)
            .after_connect(move |_conn, meta| {
                let key = hook_key.clone();
                Box::pin(async move {
                    debug!(pool = %key, age = ?meta.age, "Physical connection established");
                    Ok(())
                })
            })
            .connect_with(connect_options(config));

        let pool = match timeout(settings.connect_timeout, connect).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(e)) => {
                return Err(DbError::connection(
                    format!("Failed to connect: {}", e),
                    connection_suggestion(&e),
                ));
            }
            Err(_) => {
                return Err(DbError::timeout(
                    "connect",
                    settings.connect_timeout.as_millis() as u64,
                ));
            }
        };

        Ok(MySqlPoolHandle {
            key,
            pool,
            settings: settings.clone(),
            waiting: Arc::new(AtomicUsize::new(0)),
            flavor: Arc::new(OnceCell::new()),
        })
    }
}

/// A live MySQL pool plus the bookkeeping the registry and executors need.
#[derive(Debug)]
pub struct MySqlPoolHandle {
    key: PoolKey,
    pool: MySqlPool,
    settings: PoolSettings,
    /// Callers currently waiting on a saturated pool.
    waiting: Arc<AtomicUsize>,
    flavor: Arc<OnceCell<ServerFlavor>>,
}

impl MySqlPoolHandle {
    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    /// Number of physical connections, idle or in use.
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    fn is_saturated(&self) -> bool {
        self.pool.num_idle() == 0 && self.pool.size() >= self.settings.connection_limit
    }

    /// Reserve a waiting slot when the pool is saturated and the queue is bounded.
    fn admit(&self) -> DbResult<Option<QueueTicket>> {
        let limit = self.settings.queue_limit;
        if limit == 0 || !self.is_saturated() {
            return Ok(None);
        }

        self.waiting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .map(|_| Some(QueueTicket(Arc::clone(&self.waiting))))
            .map_err(|_| {
                warn!(pool = %self.key, queue_limit = limit, "Connection queue full");
                DbError::queue_limit(limit)
            })
    }
}

struct QueueTicket(Arc<AtomicUsize>);

impl Drop for QueueTicket {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl PoolHandle for MySqlPoolHandle {
    type Connection = MySqlPooledConnection;

    async fn acquire(&self) -> DbResult<MySqlPooledConnection> {
        let ticket = self.admit()?;
        let acquired = self.pool.acquire().await;
        drop(ticket);

        let conn = acquired.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => DbError::timeout(
                "connection pool acquire",
                self.settings.acquire_timeout.as_millis() as u64,
            ),
            other => DbError::from(other),
        })?;

        Ok(MySqlPooledConnection {
            conn,
            flavor: Arc::clone(&self.flavor),
            in_transaction: false,
        })
    }

    async fn ping(&self) -> DbResult<()> {
        if self.pool.is_closed() {
            return Err(DbError::connection(
                "Connection pool is closed",
                "Obtain a fresh pool",
            ));
        }

        let limit = self.settings.connect_timeout;
        match timeout(limit, self.pool.execute("SELECT 1")).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(DbError::timeout(
                "liveness probe",
                limit.as_millis() as u64,
            )),
        }
    }

    async fn close(&self) -> DbResult<()> {
        // waits for borrowed connections to come back
        timeout(CLOSE_TIMEOUT, self.pool.close())
            .await
            .map_err(|_| DbError::timeout("pool close", CLOSE_TIMEOUT.as_millis() as u64))
    }

    fn settings(&self) -> &PoolSettings {
        &self.settings
    }
}

/// A connection checked out of a [`MySqlPoolHandle`].
///
/// Returned to the pool on drop, or closed when a transaction is still open.
pub struct MySqlPooledConnection {
    conn: PoolConnection<MySql>,
    flavor: Arc<OnceCell<ServerFlavor>>,
    in_transaction: bool,
}

async fn detect_flavor(conn: &mut MySqlConnection) -> DbResult<ServerFlavor> {
    let version: String = sqlx::query_scalar("SELECT VERSION()")
        .fetch_one(&mut *conn)
        .await?;
    debug!(version = %version, "Detected server version");
    Ok(ServerFlavor::from_version(&version))
}

impl MySqlPooledConnection {
    /// Result-set columns of `sql` from a prepare round-trip. Statements that
    /// cannot be prepared, or return no result set, yield no columns.
    async fn describe_columns(&mut self, sql: &str) -> Vec<ColumnMetadata> {
        match (&mut *self.conn).describe(sql).await {
            Ok(described) => columns_metadata(described.columns()),
            Err(e) => {
                debug!(error = %e, "Could not describe statement columns");
                Vec::new()
            }
        }
    }
}

impl PooledConnection for MySqlPooledConnection {
    async fn set_execution_cap(&mut self, cap: Duration) -> DbResult<()> {
        let conn = &mut *self.conn;
        let flavor = *self.flavor.get_or_try_init(|| detect_flavor(conn)).await?;

        let sql = flavor.execution_cap_sql(cap);
        (&mut *self.conn).execute(sql.as_str()).await?;
        Ok(())
    }

    async fn run(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryOutput> {
        let mut output = QueryOutput::default();
        {
            let conn = &mut *self.conn;
            // When params is empty, use raw SQL (text protocol) so statements that
            // cannot be prepared still run
            let mut stream = if params.is_empty() {
                conn.fetch_many(sql)
            } else {
                let mut query = sqlx::query(sql);
                for param in params {
                    query = bind_mysql_param(query, param);
                }
                conn.fetch_many(query)
            };

            while let Some(item) = stream.try_next().await? {
                match item {
                    Either::Left(done) => {
                        output.rows_affected += done.rows_affected();
                        if done.last_insert_id() > 0 {
                            output.last_insert_id = Some(done.last_insert_id());
                        }
                    }
                    Either::Right(row) => {
                        if output.fields.is_empty() {
                            output.fields = row.get_column_metadata();
                        }
                        output.rows.push(row.to_json_map());
                    }
                }
            }
        }

        // an empty result set still has columns, but no row to read them from
        if output.rows.is_empty() && output.rows_affected == 0 {
            output.fields = self.describe_columns(sql).await;
        }
        Ok(output)
    }

    async fn begin(&mut self) -> DbResult<()> {
        // set first: a half-sent BEGIN still leaves the session suspect
        self.in_transaction = true;
        (&mut *self.conn).execute("START TRANSACTION").await?;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        (&mut *self.conn).execute("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        (&mut *self.conn).execute("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }
}

impl Drop for MySqlPooledConnection {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!("Connection released with an open transaction, closing it");
            self.conn.close_on_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_build_can_negotiate_tls() {
        // ssl=true maps to Required, which sqlx rejects without a TLS backend
        assert!(cfg!(any(feature = "tls-rustls", feature = "tls-native")));
        let config = ConnectionConfig::new("h", 3306, "u", "", "d").with_ssl(true);
        let options = connect_options(&config);
        assert!(matches!(options.get_ssl_mode(), MySqlSslMode::Required));
    }

    #[test]
    fn test_server_flavor_from_version() {
        assert_eq!(ServerFlavor::from_version("8.0.36"), ServerFlavor::MySql);
        assert_eq!(
            ServerFlavor::from_version("10.11.6-MariaDB-0+deb12u1"),
            ServerFlavor::MariaDb
        );
    }

    #[test]
    fn test_execution_cap_sql() {
        let cap = Duration::from_millis(1500);
        assert_eq!(
            ServerFlavor::MySql.execution_cap_sql(cap),
            "SET SESSION max_execution_time = 1500"
        );
        assert_eq!(
            ServerFlavor::MariaDb.execution_cap_sql(cap),
            "SET SESSION max_statement_time = 1.5"
        );
        assert_eq!(
            ServerFlavor::MariaDb.execution_cap_sql(Duration::from_secs(60)),
            "SET SESSION max_statement_time = 60"
        );
    }

    #[test]
    fn test_connect_options() {
        let config = ConnectionConfig::new("db.local", 3307, "app", "secret", "sales");
        let options = connect_options(&config);
        assert_eq!(options.get_host(), "db.local");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "app");
        assert_eq!(options.get_database(), Some("sales"));
    }

    #[test]
    fn test_connection_suggestion() {
        let refused = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "Connection refused",
        ));
        assert!(connection_suggestion(&refused).contains("running"));

        let other = sqlx::Error::Protocol("weird".to_string());
        assert!(connection_suggestion(&other).contains("host"));
    }

    #[tokio::test]
    async fn test_create_pool_rejects_empty_host() {
        let config = ConnectionConfig::new("", 3306, "app", "", "sales");
        let err = MySqlConnector
            .create_pool(&config, &PoolSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
    }
}
