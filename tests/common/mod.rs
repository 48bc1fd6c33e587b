//! In-memory backend used by the integration tests.
//!
//! Statements understood by [`FakeConnection::run`]:
//! - `INSERT ...` with one integer parameter stages that value
//! - `SELECT ...` returns every committed value as `{"v": n}`
//! - anything else fails with a syntax error

#![allow(dead_code)]

use dbmaster_pool::config::PoolSettings;
use dbmaster_pool::db::{PoolConnector, PoolHandle, PooledConnection};
use dbmaster_pool::error::{DbError, DbResult};
use dbmaster_pool::models::{ColumnMetadata, ConnectionConfig, QueryOutput, QueryParam};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Counters and switches shared by a connector and everything it creates.
#[derive(Debug, Default)]
pub struct FakeState {
    pub creates: AtomicUsize,
    pub closes: AtomicUsize,
    pub close_attempts: AtomicUsize,
    pub acquires: AtomicUsize,
    pub releases: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub commits: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_acquire: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
    pub committed: Mutex<Vec<i64>>,
    pub last_cap: Mutex<Option<Duration>>,
    pub create_delay: Mutex<Option<Duration>>,
    pub last_settings: Mutex<Option<PoolSettings>>,
}

impl FakeState {
    pub fn committed(&self) -> Vec<i64> {
        self.committed.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    pub state: Arc<FakeState>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create_delay(delay: Duration) -> Self {
        let connector = Self::default();
        *connector.state.create_delay.lock().unwrap() = Some(delay);
        connector
    }
}

impl PoolConnector for FakeConnector {
    type Pool = FakePool;

    async fn create_pool(
        &self,
        _config: &ConnectionConfig,
        settings: &PoolSettings,
    ) -> DbResult<FakePool> {
        let delay = *self.state.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(DbError::connection(
                "Access denied for user",
                "Verify the user name and password",
            ));
        }

        let id = self.state.creates.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.last_settings.lock().unwrap() = Some(settings.clone());
        Ok(FakePool {
            id,
            settings: settings.clone(),
            state: Arc::clone(&self.state),
            fail_probe: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
pub struct FakePool {
    pub id: usize,
    pub settings: PoolSettings,
    pub state: Arc<FakeState>,
    pub fail_probe: AtomicBool,
    pub fail_close: AtomicBool,
    pub closed: AtomicBool,
}

impl PoolHandle for FakePool {
    type Connection = FakeConnection;

    async fn acquire(&self) -> DbResult<FakeConnection> {
        if self.state.fail_acquire.load(Ordering::SeqCst) {
            return Err(DbError::timeout(
                "connection pool acquire",
                self.settings.acquire_timeout.as_millis() as u64,
            ));
        }
        self.state.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
            in_transaction: false,
        })
    }

    async fn ping(&self) -> DbResult<()> {
        if self.fail_probe.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return Err(DbError::connection(
                "Connection lost: server has gone away",
                "Check network connectivity",
            ));
        }
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        self.state.close_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(DbError::timeout("pool close", 5_000));
        }
        self.closed.store(true, Ordering::SeqCst);
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn settings(&self) -> &PoolSettings {
        &self.settings
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    state: Arc<FakeState>,
    staged: Vec<i64>,
    in_transaction: bool,
}

fn syntax_error() -> DbError {
    DbError::database(
        "You have an error in your SQL syntax",
        Some("42000".to_string()),
        "Check the SQL syntax and referenced objects",
    )
}

impl PooledConnection for FakeConnection {
    async fn set_execution_cap(&mut self, cap: Duration) -> DbResult<()> {
        *self.state.last_cap.lock().unwrap() = Some(cap);
        Ok(())
    }

    async fn run(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryOutput> {
        let upper = sql.trim_start().to_ascii_uppercase();
        if upper.starts_with("INSERT") {
            let value = match params.first() {
                Some(QueryParam::Int(v)) => *v,
                _ => return Err(DbError::invalid_input("INSERT needs one integer parameter")),
            };
            if self.in_transaction {
                self.staged.push(value);
            } else {
                self.state.committed.lock().unwrap().push(value);
            }
            return Ok(QueryOutput::write_result(1, Some(value as u64)));
        }

        if upper.starts_with("SELECT") {
            let mut visible = self.state.committed();
            visible.extend(self.staged.iter().copied());
            let rows = visible
                .into_iter()
                .map(|v| {
                    let mut row = serde_json::Map::new();
                    row.insert("v".to_string(), serde_json::json!(v));
                    row
                })
                .collect();
            return Ok(QueryOutput {
                rows,
                fields: vec![ColumnMetadata::new("v", "BIGINT", false)],
                ..QueryOutput::default()
            });
        }

        Err(syntax_error())
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        if self.state.fail_commit.load(Ordering::SeqCst) {
            return Err(DbError::database(
                "Deadlock found when trying to get lock",
                Some("40001".to_string()),
                "Retry the transaction",
            ));
        }
        self.state
            .committed
            .lock()
            .unwrap()
            .extend(self.staged.drain(..));
        self.in_transaction = false;
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        // staged values are never committed either way
        self.staged.clear();
        self.in_transaction = false;
        if self.state.fail_rollback.load(Ordering::SeqCst) {
            return Err(DbError::connection(
                "Lost connection to MySQL server during query",
                "Check network connectivity",
            ));
        }
        Ok(())
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn config(password: &str) -> ConnectionConfig {
    ConnectionConfig::new("db.local", 3306, "app", password, "sales")
}
