//! Capability surface published to other components.
//!
//! [`DatabaseApi`] is what consumers program against; [`DatabaseService`] is
//! its implementation. Both are published in the service registry: look up
//! `dyn DatabaseApi` for the capability, or `DatabaseService` when the
//! generic connection operations are needed.
//!
//! Operations handed to `execute`/`execute_async` have the same shape sqlx
//! uses for `Connection::transaction`: a closure that borrows the connection
//! for the duration of a boxed future.
//!
//! ```ignore
//! let count = db.execute(|conn| Box::pin(async move {
//!     let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM players")
//!         .fetch_one(&mut *conn)
//!         .await?;
//!     Ok(row.0)
//! }))?;
//! ```

mod service;

pub use crate::db::pool::{PoolStatus, ServiceState};
pub use service::DatabaseService;

use crate::error::DbResult;
use crate::models::{RowResult, SqlValue};
use crate::task::TaskHandle;
use futures_util::future::BoxFuture;
use sqlx::MySql;
use sqlx::mysql::MySqlConnection;
use sqlx::pool::PoolConnection;
use std::future::Future;

/// Pooled database access.
///
/// Usable as `dyn DatabaseApi` for `is_connected`, `query` and `update`. The
/// connection-level operations are generic and need a concrete implementor.
pub trait DatabaseApi: Send + Sync {
    /// Borrow a connection from the pool.
    ///
    /// The caller owns it and releases it by dropping it, which must happen
    /// inside a tokio runtime.
    fn get_connection(&self) -> impl Future<Output = DbResult<PoolConnection<MySql>>> + Send
    where
        Self: Sized;

    /// Run `operation` on a pooled connection and block until it finishes.
    ///
    /// The connection is released whether the operation succeeds or fails.
    fn execute<T, F>(&self, operation: F) -> DbResult<T>
    where
        Self: Sized,
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut MySqlConnection) -> BoxFuture<'c, DbResult<T>>
            + Send
            + 'static;

    /// Run `operation` in the background. Failures arrive through the handle.
    fn execute_async<T, F>(&self, operation: F) -> TaskHandle<T>
    where
        Self: Sized,
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut MySqlConnection) -> BoxFuture<'c, DbResult<T>>
            + Send
            + 'static;

    /// Whether the database answers: borrows a connection, pings it and
    /// releases it. Blocks until the check finishes; any failure is `false`.
    fn is_connected(&self) -> bool;

    /// Run a parameterized query and materialize its rows.
    fn query(&self, sql: &str, params: Vec<SqlValue>) -> TaskHandle<RowResult>;

    /// Run a parameterized statement and return the affected row count.
    fn update(&self, sql: &str, params: Vec<SqlValue>) -> TaskHandle<u64>;
}
