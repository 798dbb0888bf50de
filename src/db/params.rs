//! Parameter binding utilities for database queries.
//!
//! Positional `?` placeholders are bound in order from a slice of
//! [`SqlValue`]s. The number of values is never checked against the number
//! of placeholders here; the server reports a mismatch as a statement error.

use crate::models::SqlValue;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_param<'q>(query: MySqlQuery<'q>, param: &'q SqlValue) -> MySqlQuery<'q> {
    match param {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::String(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind every parameter, in order.
pub(crate) fn bind_all<'q>(query: MySqlQuery<'q>, params: &'q [SqlValue]) -> MySqlQuery<'q> {
    params.iter().fold(query, bind_param)
}
