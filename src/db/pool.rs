//! Connection pool management.
//!
//! [`DatabaseManager`] owns the single MySQL pool of the process. It moves
//! through three states: `Uninitialized` until a pool has been built and a
//! liveness probe has borrowed and returned one connection, `Ready` while the
//! pool serves connections, and `Closed` once shut down. `Closed` is terminal.

use crate::config::PoolSettings;
use crate::db::executor::QueryExecutor;
use crate::error::{DbError, DbResult};
use futures_util::future::BoxFuture;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPoolOptions, MySqlSslMode};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, MySql, MySqlPool};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Uninitialized,
    Ready,
    Closed,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Uninitialized => write!(f, "uninitialized"),
            ServiceState::Ready => write!(f, "ready"),
            ServiceState::Closed => write!(f, "closed"),
        }
    }
}

/// Pool occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStatus {
    /// Open connections, borrowed or idle
    pub size: u32,
    pub idle: usize,
    pub max_size: u32,
}

impl PoolStatus {
    /// Connections currently borrowed.
    pub fn in_use(&self) -> usize {
        (self.size as usize).saturating_sub(self.idle)
    }
}

enum PoolState {
    Uninitialized,
    Ready {
        pool: MySqlPool,
        settings: Arc<PoolSettings>,
    },
    Closed,
}

impl PoolState {
    fn service_state(&self) -> ServiceState {
        match self {
            PoolState::Uninitialized => ServiceState::Uninitialized,
            PoolState::Ready { .. } => ServiceState::Ready,
            PoolState::Closed => ServiceState::Closed,
        }
    }
}

impl std::fmt::Debug for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolState::Ready { pool, settings } => f
                .debug_struct("Ready")
                .field("target", &settings.target())
                .field("size", &pool.size())
                .field("idle", &pool.num_idle())
                .finish(),
            other => write!(f, "{}", other.service_state()),
        }
    }
}

/// Owner of the process-wide connection pool.
#[derive(Debug)]
pub struct DatabaseManager {
    state: RwLock<PoolState>,
    /// Serializes initialization so only one pool is ever built
    init_lock: Mutex<()>,
}

impl DatabaseManager {
    /// Create a manager in the `Uninitialized` state.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PoolState::Uninitialized),
            init_lock: Mutex::new(()),
        }
    }

    /// Build the pool from a key-value configuration and probe it once.
    ///
    /// Never returns an error: failures are logged and reported as `false`,
    /// leaving the manager `Uninitialized`.
    pub async fn initialize(&self, config: &config::Config) -> bool {
        let settings = match PoolSettings::from_config(config) {
            Ok(settings) => settings,
            Err(e) => {
                error!(error = %e, "Invalid database configuration");
                return false;
            }
        };

        let target = settings.target();
        match self.try_initialize(settings).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    target = %target,
                    error = %e,
                    suggestion = e.suggestion().unwrap_or_default(),
                    "Failed to initialize database connection pool"
                );
                false
            }
        }
    }

    /// Build the pool from validated settings and run the liveness probe.
    ///
    /// Calling this while `Ready` keeps the existing pool. After shutdown the
    /// manager cannot be initialized again.
    pub async fn try_initialize(&self, settings: PoolSettings) -> DbResult<()> {
        let _guard = self.init_lock.lock().await;

        match self.state() {
            ServiceState::Ready => {
                warn!("Database connection pool is already initialized");
                return Ok(());
            }
            ServiceState::Closed => {
                return Err(DbError::not_initialized(
                    "Database connection pool has been shut down",
                ));
            }
            ServiceState::Uninitialized => {}
        }

        settings.validate()?;

        info!(
            target = %settings.target(),
            max_pool_size = settings.max_pool_size,
            min_idle = settings.min_idle,
            connection_timeout_ms = settings.connection_timeout.as_millis() as u64,
            "Initializing database connection pool"
        );

        let pool = build_pool(&settings);
        if let Err(e) = probe(&pool, &settings).await {
            pool.close().await;
            return Err(e);
        }

        let settings = Arc::new(settings);
        let rejected = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            match *state {
                PoolState::Uninitialized => {
                    *state = PoolState::Ready {
                        pool,
                        settings: Arc::clone(&settings),
                    };
                    None
                }
                // Shut down while the probe was running
                _ => Some(pool),
            }
        };

        if let Some(pool) = rejected {
            pool.close().await;
            return Err(DbError::not_initialized(
                "Database connection pool was shut down during initialization",
            ));
        }

        info!(target = %settings.target(), "Database connection pool initialized");
        Ok(())
    }

    /// Borrow a connection. It returns to the pool when dropped.
    pub async fn acquire(&self) -> DbResult<PoolConnection<MySql>> {
        let (pool, settings) = self.ready_pool()?;
        pool.acquire()
            .await
            .map_err(|e| acquire_error(e, &settings))
    }

    /// Run `operation` on a borrowed connection.
    ///
    /// The connection is released on every exit path, including when the
    /// operation fails.
    pub async fn with_connection<T, F>(&self, operation: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut MySqlConnection) -> BoxFuture<'c, DbResult<T>>,
    {
        let mut conn = self.acquire().await?;
        operation(&mut conn).await
    }

    /// Best-effort check: borrow, ping, release. Any failure reads as unhealthy.
    pub async fn is_healthy(&self) -> bool {
        let mut conn = match self.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                debug!(error = %e, "Health check could not acquire a connection");
                return false;
            }
        };
        match conn.ping().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Health check ping failed");
                false
            }
        }
    }

    /// Close the pool. Safe to call repeatedly and before initialization.
    pub async fn shutdown(&self) {
        let previous = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, PoolState::Closed)
        };

        match previous {
            PoolState::Ready { pool, settings } => {
                pool.close().await;
                info!(target = %settings.target(), "Database connection closed");
            }
            PoolState::Uninitialized => {
                debug!("Database connection pool was never initialized");
            }
            PoolState::Closed => {
                debug!("Database connection pool already closed");
            }
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .service_state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ServiceState::Ready
    }

    /// Occupancy of the pool, `None` unless `Ready`.
    pub fn status(&self) -> Option<PoolStatus> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            PoolState::Ready { pool, settings } => Some(PoolStatus {
                size: pool.size(),
                idle: pool.num_idle(),
                max_size: settings.max_pool_size,
            }),
            _ => None,
        }
    }

    /// Settings of the live pool.
    pub fn settings(&self) -> Option<Arc<PoolSettings>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            PoolState::Ready { settings, .. } => Some(Arc::clone(settings)),
            _ => None,
        }
    }

    /// Statement executor following the live pool's cache policy.
    pub fn executor(&self) -> QueryExecutor {
        self.settings()
            .map(|s| QueryExecutor::new(s.statement_cache))
            .unwrap_or_default()
    }

    fn ready_pool(&self) -> DbResult<(MySqlPool, Arc<PoolSettings>)> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            PoolState::Ready { pool, settings } => Ok((pool.clone(), Arc::clone(settings))),
            PoolState::Uninitialized => Err(DbError::not_initialized(
                "Database connection pool is not initialized",
            )),
            PoolState::Closed => Err(DbError::not_initialized(
                "Database connection pool has been shut down",
            )),
        }
    }
}

#[cfg(test)]
impl DatabaseManager {
    /// A `Ready` manager whose pool was never probed.
    pub(crate) fn with_unprobed_pool(settings: PoolSettings) -> Self {
        let pool = build_pool(&settings);
        Self {
            state: RwLock::new(PoolState::Ready {
                pool,
                settings: Arc::new(settings),
            }),
            init_lock: Mutex::new(()),
        }
    }
}

/// Settings pointing at a port nothing listens on, failing fast.
#[cfg(test)]
pub(crate) fn unreachable_settings() -> PoolSettings {
    PoolSettings {
        host: "127.0.0.1".to_string(),
        port: 1,
        min_idle: 0,
        connection_timeout: std::time::Duration::from_millis(300),
        ..PoolSettings::default()
    }
}

impl Default for DatabaseManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the pool without connecting; the probe makes the first connection.
fn build_pool(settings: &PoolSettings) -> MySqlPool {
    let ssl_mode = if settings.use_ssl {
        MySqlSslMode::Preferred
    } else {
        MySqlSslMode::Disabled
    };

    let options = MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .database(&settings.database)
        .username(&settings.username)
        .password(&settings.password)
        .charset("utf8mb4")
        .ssl_mode(ssl_mode)
        .statement_cache_capacity(settings.statement_cache.capacity());

    MySqlPoolOptions::new()
        .max_connections(settings.max_pool_size)
        .min_connections(settings.min_idle)
        .acquire_timeout(settings.connection_timeout)
        .idle_timeout(Some(settings.idle_timeout))
        .max_lifetime(Some(settings.max_lifetime))
        .test_before_acquire(true)
        .connect_lazy_with(options)
}

/// Borrow one connection and hand it straight back.
async fn probe(pool: &MySqlPool, settings: &PoolSettings) -> DbResult<()> {
    debug!(target = %settings.target(), "Running connection liveness probe");
    let conn = pool
        .acquire()
        .await
        .map_err(|e| acquire_error(e, settings))?;
    drop(conn);
    debug!(target = %settings.target(), "Liveness probe succeeded");
    Ok(())
}

fn acquire_error(err: sqlx::Error, settings: &PoolSettings) -> DbError {
    match err {
        sqlx::Error::PoolTimedOut => DbError::connection(
            format!(
                "Timed out after {} ms waiting for a connection to {}",
                settings.connection_timeout.as_millis(),
                settings.target()
            ),
            "Check that the server is reachable, or raise connection-pool.maximum-pool-size / connection-pool.connection-timeout",
        ),
        sqlx::Error::PoolClosed => {
            DbError::not_initialized("Database connection pool has been shut down")
        }
        other => DbError::connection(
            format!("Failed to connect to {}: {}", settings.target(), other),
            connection_suggestion(&other),
        ),
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return "Check that the MySQL server is running and accessible".to_string();
    }

    if error_str.contains("access denied") || error_str.contains("password") {
        return "Verify database.username and database.password".to_string();
    }

    if error_str.contains("unknown database") {
        return "Check that the database named by database.name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or set database.use-ssl to false".to_string();
    }

    "Verify database.host and database.port".to_string()
}
