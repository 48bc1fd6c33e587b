//! Error types for the pool core.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Wrapping variants (`PoolCreation`, `Query`, `Transaction`) keep the underlying
//! cause as their `source`, so callers see what was attempted and why it failed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42000" for a syntax error
        sql_state: Option<String>,
        suggestion: String,
    },

    /// `elapsed_ms` is `None` when the limit that fired is not known here.
    #[error(
        "Timeout: {operation}{}",
        .elapsed_ms.map(|ms| format!(" exceeded {ms}ms")).unwrap_or_default()
    )]
    Timeout {
        operation: String,
        elapsed_ms: Option<u64>,
    },

    #[error("Connection queue limit reached: {limit} callers already waiting")]
    QueueLimit { limit: usize },

    #[error("Failed to create pool for {pool}: {source}")]
    PoolCreation {
        pool: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("Failed to execute query: {source}")]
    Query {
        #[source]
        source: Box<DbError>,
    },

    #[error("Transaction failed during {stage}: {source}")]
    Transaction {
        stage: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms: Some(elapsed_ms),
        }
    }

    /// Create a queue limit error.
    pub fn queue_limit(limit: usize) -> Self {
        Self::QueueLimit { limit }
    }

    /// Wrap the cause of a failed pool creation.
    pub fn pool_creation(pool: impl Into<String>, source: DbError) -> Self {
        Self::PoolCreation {
            pool: pool.into(),
            source: Box::new(source),
        }
    }

    /// Wrap the cause of a failed query.
    pub fn query(source: DbError) -> Self {
        Self::Query {
            source: Box::new(source),
        }
    }

    /// Wrap the cause of a failed transaction stage.
    pub fn transaction(stage: impl Into<String>, source: DbError) -> Self {
        Self::Transaction {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The innermost error, unwrapping `PoolCreation`, `Query` and `Transaction`.
    pub fn root_cause(&self) -> &DbError {
        match self {
            Self::PoolCreation { source, .. }
            | Self::Query { source }
            | Self::Transaction { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self.root_cause() {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::QueueLimit { .. } => {
                Some("Increase queue_limit or connection_limit, or retry later")
            }
            Self::Timeout { .. } => {
                Some("Consider increasing the timeout or optimizing the operation")
            }
            _ => None,
        }
    }

    /// SQLSTATE of the underlying server error, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self.root_cause() {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// The pool core never retries on its own; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::Connection { .. } | Self::Timeout { .. } | Self::QueueLimit { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            // the configured acquire timeout is only known to the pool handle
            sqlx::Error::PoolTimedOut => DbError::Timeout {
                operation: "connection pool acquire".to_string(),
                elapsed_ms: None,
            },
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Obtain a fresh pool")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify the server supports SSL or disable use_ssl",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
