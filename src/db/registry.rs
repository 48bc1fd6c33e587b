//! Pool registry and lifecycle.
//!
//! The registry maps a pool fingerprint (`host:port:database:user`) to at most
//! one live pool handle. Cached handles are probed before reuse and replaced
//! when the probe fails.

use crate::config::PoolOptions;
use crate::db::backend::{PoolConnector, PoolHandle};
use crate::db::mysql::MySqlConnector;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, PoolKey};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Keyed store of live pool handles.
///
/// Check-then-create runs under a per-fingerprint async mutex, so concurrent
/// callers with the same fingerprint observe a single created handle while
/// callers with other fingerprints proceed independently. The `pools` map lock
/// is never held across I/O.
pub struct PoolRegistry<C: PoolConnector> {
    connector: C,
    pools: RwLock<HashMap<PoolKey, Arc<C::Pool>>>,
    creation_locks: Mutex<HashMap<PoolKey, Arc<Mutex<()>>>>,
}

impl<C: PoolConnector> PoolRegistry<C> {
    /// Create an empty registry backed by `connector`.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            pools: RwLock::new(HashMap::new()),
            creation_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Return the live pool for `config`, creating or replacing it as needed.
    ///
    /// A cached pool is probed first. A failed probe closes the old pool
    /// (close errors are logged) and a fresh one is created. `options` only
    /// apply when a pool is created.
    pub async fn obtain_pool(
        &self,
        config: &ConnectionConfig,
        options: Option<&PoolOptions>,
    ) -> DbResult<Arc<C::Pool>> {
        let key = config.pool_key();
        let lock = self.creation_lock(&key).await;
        let _guard = lock.lock().await;

        let cached = self.pools.read().await.get(&key).cloned();
        if let Some(pool) = cached {
            match pool.ping().await {
                Ok(()) => {
                    debug!(pool = %key, "Reusing cached pool");
                    return Ok(pool);
                }
                Err(e) => {
                    warn!(pool = %key, error = %e, "Pool failed liveness probe, recreating");
                    self.pools.write().await.remove(&key);
                    if let Err(close_err) = pool.close().await {
                        warn!(pool = %key, error = %close_err, "Failed to close stale pool");
                    }
                }
            }
        }

        let settings = options.cloned().unwrap_or_default().resolve();
        let pool = self
            .connector
            .create_pool(config, &settings)
            .await
            .map_err(|e| DbError::pool_creation(key.to_string(), e))?;
        let pool = Arc::new(pool);

        self.pools.write().await.insert(key.clone(), Arc::clone(&pool));
        info!(
            pool = %key,
            connection_limit = settings.connection_limit,
            queue_limit = settings.queue_limit,
            "Created connection pool"
        );
        Ok(pool)
    }

    /// Close every pool and empty the registry.
    ///
    /// Individual close failures are logged, never returned.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(PoolKey, Arc<C::Pool>)> = {
            let mut pools = self.pools.write().await;
            pools.drain().collect()
        }; // Lock released here

        let count = drained.len();
        for (key, pool) in drained {
            match pool.close().await {
                Ok(()) => info!(pool = %key, "Closed connection pool"),
                Err(e) => error!(pool = %key, error = %e, "Failed to close connection pool"),
            }
        }
        info!(count, "All connection pools shut down");
    }

    /// Number of live pools.
    pub async fn pool_count(&self) -> usize {
        self.pools.read().await.len()
    }

    pub async fn contains(&self, key: &PoolKey) -> bool {
        self.pools.read().await.contains_key(key)
    }

    /// Fingerprints of live pools, sorted.
    pub async fn pool_keys(&self) -> Vec<PoolKey> {
        let mut keys: Vec<PoolKey> = self.pools.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn creation_lock(&self, key: &PoolKey) -> Arc<Mutex<()>> {
        let mut locks = self.creation_locks.lock().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }
}

impl<C: PoolConnector + Default> Default for PoolRegistry<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

/// Process-wide registry backed by sqlx MySQL pools.
pub fn global_registry() -> &'static PoolRegistry<MySqlConnector> {
    static REGISTRY: OnceLock<PoolRegistry<MySqlConnector>> = OnceLock::new();
    REGISTRY.get_or_init(|| PoolRegistry::new(MySqlConnector))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_starts_empty() {
        let registry = PoolRegistry::new(MySqlConnector);
        assert_eq!(registry.pool_count().await, 0);
        assert!(registry.pool_keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_creation_leaves_no_entry() {
        let registry = PoolRegistry::new(MySqlConnector);
        let config = ConnectionConfig::new("", 3306, "app", "", "sales");

        let err = registry.obtain_pool(&config, None).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to create pool for :3306:sales:app"));
        assert!(matches!(err.root_cause(), DbError::InvalidInput { .. }));
        assert!(!registry.contains(&config.pool_key()).await);
    }

    #[tokio::test]
    async fn test_shutdown_empty_registry() {
        let registry = PoolRegistry::new(MySqlConnector);
        registry.shutdown_all().await;
        assert_eq!(registry.pool_count().await, 0);
    }

    #[test]
    fn test_global_registry_is_singleton() {
        assert!(std::ptr::eq(global_registry(), global_registry()));
    }
}
