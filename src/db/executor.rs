//! Query and transaction execution.
//!
//! Every call borrows exactly one connection from the pool and releases it
//! before returning, on success and on every error path. Release is tied to
//! the borrowed connection's lifetime.
//!
//! # Transactions
//!
//! `execute_in_transaction` walks
//! `ACQUIRED -> BEGUN -> RUNNING* -> COMMITTED | ROLLED_BACK -> RELEASED`.
//! If setup fails the connection goes straight to RELEASED.

use crate::config::DEFAULT_QUERY_TIMEOUT_MS;
use crate::db::backend::{PoolHandle, PooledConnection};
use crate::error::{DbError, DbResult};
use crate::models::{QueryOutput, QueryParam, QueryRequest, Statement};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Query executor that handles single queries and transactions.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    default_timeout: Duration,
}

impl QueryExecutor {
    /// Create a new query executor with the default 60s execution cap.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
        }
    }

    /// Create a new query executor with a custom default execution cap.
    pub fn with_default_timeout(timeout: Duration) -> Self {
        Self {
            default_timeout: timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run one statement on a borrowed connection.
    ///
    /// Errors are wrapped as `Failed to execute query: <cause>`; nothing is retried.
    pub async fn execute<P: PoolHandle>(
        &self,
        pool: &P,
        sql: &str,
        params: &[QueryParam],
        timeout: Option<Duration>,
    ) -> DbResult<QueryOutput> {
        let start = Instant::now();
        let cap = timeout.unwrap_or(self.default_timeout);

        debug!(
            sql = %sql,
            params = params.len(),
            timeout_ms = cap.as_millis() as u64,
            "Executing query"
        );

        let result: DbResult<QueryOutput> = async {
            let mut conn = pool.acquire().await?;
            conn.set_execution_cap(cap).await?;
            conn.run(sql, params).await
        }
        .await;

        match result {
            Ok(output) => {
                debug!(
                    rows = output.row_count(),
                    rows_affected = output.rows_affected,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Query completed"
                );
                Ok(output)
            }
            Err(e) => {
                debug!(error = %e, "Query failed");
                Err(DbError::query(e))
            }
        }
    }

    /// Request-shaped variant of [`QueryExecutor::execute`].
    pub async fn execute_request<P: PoolHandle>(
        &self,
        pool: &P,
        request: &QueryRequest,
    ) -> DbResult<QueryOutput> {
        self.execute(
            pool,
            &request.sql,
            &request.params,
            request.timeout_ms.map(Duration::from_millis),
        )
        .await
    }

    /// Run `statements` atomically on one borrowed connection.
    ///
    /// Results follow input order. On any statement or commit failure the
    /// transaction is rolled back and the original error is returned with the
    /// failing stage. An empty list commits an empty transaction.
    pub async fn execute_in_transaction<P: PoolHandle>(
        &self,
        pool: &P,
        statements: &[Statement],
        timeout: Option<Duration>,
    ) -> DbResult<Vec<QueryOutput>> {
        let start = Instant::now();
        let cap = timeout.unwrap_or(self.default_timeout);

        debug!(
            statements = statements.len(),
            timeout_ms = cap.as_millis() as u64,
            "Executing transaction"
        );

        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| DbError::transaction("acquire", e))?;
        conn.set_execution_cap(cap)
            .await
            .map_err(|e| DbError::transaction("setup", e))?;
        conn.begin()
            .await
            .map_err(|e| DbError::transaction("begin", e))?;

        let mut results = Vec::with_capacity(statements.len());
        for (idx, statement) in statements.iter().enumerate() {
            match conn.run(&statement.sql, &statement.params).await {
                Ok(output) => results.push(output),
                Err(e) => {
                    let stage = format!("statement {}", idx + 1);
                    warn!(stage = %stage, error = %e, "Transaction statement failed, rolling back");
                    rollback_quietly(&mut conn).await;
                    return Err(DbError::transaction(stage, e));
                }
            }
        }

        if let Err(e) = conn.commit().await {
            warn!(error = %e, "Commit failed, rolling back");
            rollback_quietly(&mut conn).await;
            return Err(DbError::transaction("commit", e));
        }

        debug!(
            statements = statements.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Transaction committed"
        );
        Ok(results)
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Roll back; a failure here is logged and never replaces the primary error.
async fn rollback_quietly<C: PooledConnection>(conn: &mut C) {
    if let Err(e) = conn.rollback().await {
        error!(error = %e, "Rollback failed");
    }
}
