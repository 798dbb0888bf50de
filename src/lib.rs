//! Database Core Library
//!
//! A pooled MySQL access layer for plugin-based hosts. The pool is built and
//! probed once at startup; other components reach it through the
//! [`DatabaseApi`] capability published in the [`ServiceRegistry`], running
//! queries and updates synchronously or in the background.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod plugin;
pub mod registry;
pub mod task;

pub use api::{DatabaseApi, DatabaseService, PoolStatus, ServiceState};
pub use config::PoolSettings;
pub use db::DatabaseManager;
pub use error::{DbError, DbResult};
pub use models::{Row, RowResult, SqlValue};
pub use plugin::{DatabaseCore, Plugin, PluginContext};
pub use registry::{ServicePriority, ServiceRegistry};
pub use task::{TaskHandle, WorkerPool};
