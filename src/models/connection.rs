//! Connection-related data models.
//!
//! This module defines the connection configuration a pool is built from and
//! the fingerprint used to key pools in the registry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for a MySQL/MariaDB connection.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Contains sensitive data - never log
    #[serde(skip_serializing, default)]
    pub password: String,
    pub database: String,
    /// Server certificates are accepted without verification.
    #[serde(default)]
    pub use_ssl: bool,
}

impl ConnectionConfig {
    /// Create a new connection configuration without SSL.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
            use_ssl: false,
        }
    }

    /// Request an SSL connection.
    pub fn with_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    /// Fingerprint identifying the pool for this configuration.
    ///
    /// The password is not part of the fingerprint: configurations that differ
    /// only in password share one pool. Text fields are percent-encoded so a `:`
    /// inside a host, database or user name cannot shift the field boundaries.
    pub fn pool_key(&self) -> PoolKey {
        PoolKey(format!(
            "{}:{}:{}:{}",
            urlencoding::encode(&self.host),
            self.port,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.user)
        ))
    }

    /// Check the fields a connection cannot be attempted without.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host cannot be empty".to_string());
        }
        if self.user.is_empty() {
            return Err("user cannot be empty".to_string());
        }
        if self.database.is_empty() {
            return Err("database cannot be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"****")
            .field("database", &self.database)
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

/// Registry key in the form `host:port:database:user`, text fields percent-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PoolKey(String);

impl PoolKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
