//! Statement execution on a borrowed connection.
//!
//! The executor never touches the pool: callers hand it a connection they
//! already own, so release stays with whoever acquired it. Query results are
//! fully materialized into a [`RowResult`] before returning.
//!
//! When there are no parameters the SQL text is sent unprepared, which keeps
//! statements that the server refuses to prepare (some DDL, `CREATE
//! PROCEDURE`, ...) working.

use crate::config::StatementCacheSettings;
use crate::db::params::bind_all;
use crate::error::DbResult;
use crate::models::{RowResult, SqlValue};
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Column, Executor, Statement};
use tracing::{debug, warn};

/// Runs SQL against a connection it does not own.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor {
    cache: StatementCacheSettings,
}

impl QueryExecutor {
    /// Create an executor using the given statement cache policy.
    pub fn new(cache: StatementCacheSettings) -> Self {
        Self { cache }
    }

    /// Whether a prepared statement for `sql` is kept in the connection's cache.
    pub fn persistent(&self, sql: &str) -> bool {
        self.cache.should_persist(sql)
    }

    /// Execute a query and materialize every row.
    pub async fn fetch_result(
        &self,
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<RowResult> {
        debug!(sql = %sql, params = params.len(), "Executing query");

        let rows: Vec<MySqlRow> = if params.is_empty() {
            (&mut *conn).fetch_all(sql).await?
        } else {
            bind_all(sqlx::query(sql), params)
                .persistent(self.persistent(sql))
                .fetch_all(&mut *conn)
                .await?
        };

        if rows.is_empty() {
            let columns = self.describe_columns(conn, sql).await;
            return Ok(RowResult::new(columns, Vec::new()));
        }

        debug!(rows = rows.len(), "Query returned rows");
        Ok(RowResult::from_rows(Some(rows.as_slice())))
    }

    /// Execute an INSERT/UPDATE/DELETE (or DDL) and return the affected row count.
    pub async fn execute_update(
        &self,
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[SqlValue],
    ) -> DbResult<u64> {
        debug!(sql = %sql, params = params.len(), "Executing update");

        let result = if params.is_empty() {
            (&mut *conn).execute(sql).await?
        } else {
            bind_all(sqlx::query(sql), params)
                .persistent(self.persistent(sql))
                .execute(&mut *conn)
                .await?
        };

        Ok(result.rows_affected())
    }

    /// Column names from statement metadata, for results without rows.
    ///
    /// Statements that cannot be described (or return no result set) give an
    /// empty list.
    async fn describe_columns(&self, conn: &mut MySqlConnection, sql: &str) -> Vec<String> {
        match (&mut *conn).prepare(sql).await {
            Ok(statement) => statement
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect(),
            Err(e) => {
                warn!(sql = %sql, error = %e, "Could not describe result columns");
                Vec::new()
            }
        }
    }
}
