//! Execution facade over the pool manager.

use super::{DatabaseApi, PoolStatus, ServiceState};
use crate::db::DatabaseManager;
use crate::error::DbResult;
use crate::models::{RowResult, SqlValue};
use crate::task::{TaskHandle, WorkerPool};
use futures_util::future::BoxFuture;
use sqlx::MySql;
use sqlx::mysql::MySqlConnection;
use sqlx::pool::PoolConnection;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

/// Routes every operation through the [`DatabaseManager`] and runs it on the
/// [`WorkerPool`], so borrowed connections are opened, used and returned on
/// the worker runtime.
#[derive(Debug, Clone)]
pub struct DatabaseService {
    manager: Arc<DatabaseManager>,
    workers: Arc<WorkerPool>,
}

impl DatabaseService {
    pub fn new(manager: Arc<DatabaseManager>, workers: Arc<WorkerPool>) -> Self {
        Self { manager, workers }
    }

    pub fn manager(&self) -> &Arc<DatabaseManager> {
        &self.manager
    }

    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.workers
    }

    pub fn state(&self) -> ServiceState {
        self.manager.state()
    }

    /// Pool occupancy, `None` unless connected.
    pub fn pool_status(&self) -> Option<PoolStatus> {
        self.manager.status()
    }

    /// Background health check (borrow, ping, release).
    pub fn health(&self) -> TaskHandle<bool> {
        let manager = Arc::clone(&self.manager);
        self.workers
            .spawn(async move { Ok(manager.is_healthy().await) })
    }

    /// Close the pool and wait for it to drain. Idempotent.
    pub fn shutdown(&self) {
        let manager = Arc::clone(&self.manager);
        let closed = self.workers.block_on(async move {
            manager.shutdown().await;
            Ok(())
        });
        if let Err(e) = closed {
            warn!(error = %e, "Could not close the pool on the worker pool");
        }
    }

    fn submit<T, F>(&self, operation: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut MySqlConnection) -> BoxFuture<'c, DbResult<T>>
            + Send
            + 'static,
    {
        let manager = Arc::clone(&self.manager);
        self.workers
            .spawn(async move { manager.with_connection(operation).await })
    }
}

impl DatabaseApi for DatabaseService {
    fn get_connection(&self) -> impl Future<Output = DbResult<PoolConnection<MySql>>> + Send {
        let manager = Arc::clone(&self.manager);
        self.workers.spawn(async move { manager.acquire().await })
    }

    fn execute<T, F>(&self, operation: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut MySqlConnection) -> BoxFuture<'c, DbResult<T>>
            + Send
            + 'static,
    {
        self.submit(operation).wait()
    }

    fn execute_async<T, F>(&self, operation: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut MySqlConnection) -> BoxFuture<'c, DbResult<T>>
            + Send
            + 'static,
    {
        let manager = Arc::clone(&self.manager);
        self.workers.spawn(async move {
            let result = manager.with_connection(operation).await;
            if let Err(e) = &result {
                error!(error = %e, "Async database operation failed");
            }
            result
        })
    }

    fn is_connected(&self) -> bool {
        self.health().wait().unwrap_or(false)
    }

    fn query(&self, sql: &str, params: Vec<SqlValue>) -> TaskHandle<RowResult> {
        let manager = Arc::clone(&self.manager);
        let sql = sql.to_string();
        self.workers.spawn(async move {
            let executor = manager.executor();
            let statement = sql.clone();
            let result = manager
                .with_connection(move |conn| {
                    Box::pin(async move { executor.fetch_result(conn, &statement, &params).await })
                })
                .await;
            if let Err(e) = &result {
                error!(sql = %sql, error = %e, "Query failed");
            }
            result
        })
    }

    fn update(&self, sql: &str, params: Vec<SqlValue>) -> TaskHandle<u64> {
        let manager = Arc::clone(&self.manager);
        let sql = sql.to_string();
        self.workers.spawn(async move {
            let executor = manager.executor();
            let statement = sql.clone();
            let result = manager
                .with_connection(move |conn| {
                    Box::pin(async move {
                        executor.execute_update(conn, &statement, &params).await
                    })
                })
                .await;
            if let Err(e) = &result {
                error!(sql = %sql, error = %e, "Update failed");
            }
            result
        })
    }
}
