//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool lifecycle (build, liveness probe, borrow, shutdown)
//! - Statement execution on borrowed connections
//! - Parameter binding and the `params!` macro
//! - MySQL type mappings

pub mod executor;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod types;

pub use executor::QueryExecutor;
pub use pool::{DatabaseManager, PoolStatus, ServiceState};
pub use types::RowToValues;
