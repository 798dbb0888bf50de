//! Error types for the database core.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! The variants follow the failure taxonomy callers care about: bad settings at
//! startup, failure to obtain a connection, failure of a statement, and use of
//! the layer outside its `Ready` state.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message} (key: {key})")]
    Configuration { key: String, message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Operation failed: {message}")]
    Operation {
        message: String,
        /// e.g., "23000" for an integrity constraint violation
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Not initialized: {message}")]
    NotInitialized { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error for the given key.
    pub fn configuration(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an operation error with optional SQL state.
    pub fn operation(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Operation {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a not-initialized error.
    pub fn not_initialized(message: impl Into<String>) -> Self {
        Self::NotInitialized {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Operation { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Get the SQLSTATE reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Operation { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// True for failures to obtain a usable connection, including use before
    /// startup or after shutdown.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::NotInitialized { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the database host, port and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::operation(
                    db_err.message(),
                    code,
                    "Check the SQL syntax, referenced objects and constraints",
                )
            }
            sqlx::Error::RowNotFound => DbError::operation(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Increase connection-pool.maximum-pool-size or connection-pool.connection-timeout",
            ),
            sqlx::Error::PoolClosed => DbError::connection(
                "Connection pool is closed",
                "The database layer has been shut down",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration or set database.use-ssl to false",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::operation(
                format!("Column not found: {}", col),
                None,
                "Check the selected column names",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert configuration source errors to DbError.
impl From<config::ConfigError> for DbError {
    fn from(err: config::ConfigError) -> Self {
        match &err {
            config::ConfigError::NotFound(key) => {
                DbError::configuration(key.clone(), "required setting is missing")
            }
            config::ConfigError::Type { key, .. } => DbError::configuration(
                key.clone().unwrap_or_else(|| "<unknown>".to_string()),
                err.to_string(),
            ),
            _ => DbError::configuration("<source>", err.to_string()),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
