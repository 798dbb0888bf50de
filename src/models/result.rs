//! Detached query results.
//!
//! A [`RowResult`] is fully materialized before the connection that produced
//! it goes back to the pool, so it stays valid for as long as the caller keeps
//! it. It is read-only: every accessor hands out copies.

use crate::db::types::RowToValues;
use crate::models::SqlValue;
use serde::Serialize;
use std::collections::HashMap;

/// One row, keyed by column name.
pub type Row = HashMap<String, SqlValue>;

/// Immutable snapshot of a query's tabular output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowResult {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl RowResult {
    /// Create an empty result (zero columns, zero rows).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a result from column names and positional row values.
    ///
    /// Column names are kept in query order, duplicates included. When two
    /// columns share a name the later one wins inside the row mapping.
    /// Values beyond the known columns are ignored.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect())
            .collect();
        Self { columns, rows }
    }

    /// Materialize rows read from a cursor-like source.
    ///
    /// An absent source produces an empty result rather than an error.
    /// Column names come from the first row, so an empty slice also yields
    /// zero columns; the executor supplies statement metadata instead when it
    /// has it. Each row is keyed by its own columns, which differ from the
    /// first row's when the source spans several result sets.
    pub fn from_rows<R: RowToValues>(rows: Option<&[R]>) -> Self {
        let Some(rows) = rows else {
            return Self::empty();
        };
        let columns = rows
            .first()
            .map(RowToValues::column_names)
            .unwrap_or_default();
        let rows = rows
            .iter()
            .map(|row| row.column_names().into_iter().zip(row.to_values()).collect())
            .collect();
        Self { columns, rows }
    }

    /// Column names in query order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    /// All rows.
    pub fn rows(&self) -> Vec<Row> {
        self.rows.clone()
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row at `index`, or an empty mapping when out of bounds.
    pub fn row_at(&self, index: usize) -> Row {
        self.rows.get(index).cloned().unwrap_or_default()
    }

    /// Equivalent to `row_at(0)`.
    pub fn first_row(&self) -> Row {
        self.row_at(0)
    }

    /// Value of `column` in the first row.
    ///
    /// A missing row, a missing column and SQL NULL all read as `None`.
    pub fn value_of(&self, column: &str) -> Option<SqlValue> {
        self.rows
            .first()
            .and_then(|row| row.get(column))
            .filter(|value| !value.is_null())
            .cloned()
    }

    /// Text form of `column` in the first row, `None` when absent.
    pub fn string_of(&self, column: &str) -> Option<String> {
        self.value_of(column).and_then(|v| v.as_string())
    }

    /// `column` in the first row as `i32`; `0` when absent or not numeric.
    pub fn int_of(&self, column: &str) -> i32 {
        self.value_of(column).and_then(|v| v.as_i32()).unwrap_or(0)
    }

    /// `column` in the first row as `i64`; `0` when absent or not numeric.
    pub fn long_of(&self, column: &str) -> i64 {
        self.value_of(column).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    /// `column` in the first row as `bool`; numbers are true when non-zero,
    /// anything else absent or non-boolean is `false`.
    pub fn bool_of(&self, column: &str) -> bool {
        self.value_of(column)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}
