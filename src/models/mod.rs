//! Data models shared by the database layer and its callers.
//!
//! This module re-exports the value and result types that cross the
//! capability boundary.

pub mod result;
pub mod value;

// Re-export commonly used types
pub use result::{Row, RowResult};
pub use value::SqlValue;
