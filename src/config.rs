//! Configuration handling for the database core.
//!
//! Pool settings are read from a key-value [`config::Config`] object using
//! dotted keys (`database.host`, `connection-pool.maximum-pool-size`, ...).
//! Absent keys fall back to the documented defaults; present but malformed
//! values are rejected with a [`DbError::Configuration`] naming the key.
//!
//! Loading the configuration file is the host's job; [`load_config`] and
//! [`save_default_config`] are provided for hosts that want the standard
//! layout, and [`Cli`] is the argument parser of the bundled demo host.

use crate::error::{DbError, DbResult};
use clap::Parser;
use config::{Environment, File, FileFormat};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_DATABASE: &str = "minecraft";
pub const DEFAULT_USERNAME: &str = "root";
pub const DEFAULT_PASSWORD: &str = "password";

// Pool configuration defaults
pub const DEFAULT_MAX_POOL_SIZE: u32 = 10;
pub const DEFAULT_MIN_IDLE: u32 = 5;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 600_000;
pub const DEFAULT_MAX_LIFETIME_MS: u64 = 1_800_000;

// Prepared statement cache defaults
pub const DEFAULT_STATEMENT_CACHE_SIZE: usize = 250;
pub const DEFAULT_STATEMENT_CACHE_SQL_LIMIT: usize = 2048;

/// Prefix for environment overrides, e.g. `DATABASE_CORE_DATABASE__HOST`.
pub const ENV_PREFIX: &str = "DATABASE_CORE";

/// Configuration keys understood by [`PoolSettings::from_config`].
pub mod keys {
    pub const HOST: &str = "database.host";
    pub const PORT: &str = "database.port";
    pub const DATABASE: &str = "database.name";
    pub const USERNAME: &str = "database.username";
    pub const PASSWORD: &str = "database.password";
    pub const USE_SSL: &str = "database.use-ssl";
    pub const MAX_POOL_SIZE: &str = "connection-pool.maximum-pool-size";
    pub const MIN_IDLE: &str = "connection-pool.minimum-idle";
    pub const CONNECTION_TIMEOUT: &str = "connection-pool.connection-timeout";
    pub const IDLE_TIMEOUT: &str = "connection-pool.idle-timeout";
    pub const MAX_LIFETIME: &str = "connection-pool.max-lifetime";
    pub const STATEMENT_CACHE_ENABLED: &str = "statement-cache.enabled";
    pub const STATEMENT_CACHE_SIZE: &str = "statement-cache.size";
    pub const STATEMENT_CACHE_SQL_LIMIT: &str = "statement-cache.sql-limit";
    pub const WORKER_THREADS: &str = "async.worker-threads";
}

/// Default configuration file written by [`save_default_config`].
pub const DEFAULT_CONFIG_YAML: &str = r#"# Database core configuration
database:
  host: localhost
  port: 3306
  name: minecraft
  username: root
  password: password
  use-ssl: false

connection-pool:
  maximum-pool-size: 10
  minimum-idle: 5
  # All timeouts are in milliseconds
  connection-timeout: 30000
  idle-timeout: 600000
  max-lifetime: 1800000

statement-cache:
  enabled: true
  size: 250
  sql-limit: 2048

async:
  # 0 uses one worker thread per CPU core
  worker-threads: 0
"#;

/// Prepared statement cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementCacheSettings {
    pub enabled: bool,
    /// Statements cached per connection
    pub size: usize,
    /// Longest SQL text (in bytes) that is eligible for caching
    pub sql_limit: usize,
}

impl Default for StatementCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            size: DEFAULT_STATEMENT_CACHE_SIZE,
            sql_limit: DEFAULT_STATEMENT_CACHE_SQL_LIMIT,
        }
    }
}

impl StatementCacheSettings {
    /// Per-connection capacity handed to the driver.
    pub fn capacity(&self) -> usize {
        if self.enabled { self.size } else { 0 }
    }

    /// Whether `sql` should be kept in the per-connection statement cache.
    pub fn should_persist(&self, sql: &str) -> bool {
        self.capacity() > 0 && sql.len() <= self.sql_limit
    }
}

/// Immutable pool configuration, built once at startup.
#[derive(Clone, PartialEq)]
pub struct PoolSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    /// Never logged; redacted from `Debug`
    pub password: String,
    pub use_ssl: bool,
    pub max_pool_size: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub statement_cache: StatementCacheSettings,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            use_ssl: false,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            min_idle: DEFAULT_MIN_IDLE,
            connection_timeout: Duration::from_millis(DEFAULT_CONNECTION_TIMEOUT_MS),
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            max_lifetime: Duration::from_millis(DEFAULT_MAX_LIFETIME_MS),
            statement_cache: StatementCacheSettings::default(),
        }
    }
}

impl fmt::Debug for PoolSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_ssl", &self.use_ssl)
            .field("max_pool_size", &self.max_pool_size)
            .field("min_idle", &self.min_idle)
            .field("connection_timeout", &self.connection_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_lifetime", &self.max_lifetime)
            .field("statement_cache", &self.statement_cache)
            .finish()
    }
}

impl PoolSettings {
    /// Build and validate pool settings from a key-value configuration.
    pub fn from_config(config: &config::Config) -> DbResult<Self> {
        let settings = Self {
            host: read_string(config, keys::HOST, DEFAULT_HOST)?,
            port: read_int(config, keys::PORT, DEFAULT_PORT)?,
            database: read_string(config, keys::DATABASE, DEFAULT_DATABASE)?,
            username: read_string(config, keys::USERNAME, DEFAULT_USERNAME)?,
            password: read_string(config, keys::PASSWORD, DEFAULT_PASSWORD)?,
            use_ssl: read_bool(config, keys::USE_SSL, false)?,
            max_pool_size: read_int(config, keys::MAX_POOL_SIZE, DEFAULT_MAX_POOL_SIZE)?,
            min_idle: read_int(config, keys::MIN_IDLE, DEFAULT_MIN_IDLE)?,
            connection_timeout: read_millis(
                config,
                keys::CONNECTION_TIMEOUT,
                DEFAULT_CONNECTION_TIMEOUT_MS,
            )?,
            idle_timeout: read_millis(config, keys::IDLE_TIMEOUT, DEFAULT_IDLE_TIMEOUT_MS)?,
            max_lifetime: read_millis(config, keys::MAX_LIFETIME, DEFAULT_MAX_LIFETIME_MS)?,
            statement_cache: StatementCacheSettings {
                enabled: read_bool(config, keys::STATEMENT_CACHE_ENABLED, true)?,
                size: read_int(
                    config,
                    keys::STATEMENT_CACHE_SIZE,
                    DEFAULT_STATEMENT_CACHE_SIZE,
                )?,
                sql_limit: read_int(
                    config,
                    keys::STATEMENT_CACHE_SQL_LIMIT,
                    DEFAULT_STATEMENT_CACHE_SQL_LIMIT,
                )?,
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check the pool invariants.
    pub fn validate(&self) -> DbResult<()> {
        if self.host.trim().is_empty() {
            return Err(DbError::configuration(keys::HOST, "host cannot be empty"));
        }
        if self.database.trim().is_empty() {
            return Err(DbError::configuration(
                keys::DATABASE,
                "database name cannot be empty",
            ));
        }
        if self.max_pool_size == 0 {
            return Err(DbError::configuration(
                keys::MAX_POOL_SIZE,
                "maximum pool size must be greater than 0",
            ));
        }
        if self.min_idle > self.max_pool_size {
            return Err(DbError::configuration(
                keys::MIN_IDLE,
                format!(
                    "minimum idle ({}) cannot exceed maximum pool size ({})",
                    self.min_idle, self.max_pool_size
                ),
            ));
        }
        for (key, value) in [
            (keys::CONNECTION_TIMEOUT, self.connection_timeout),
            (keys::IDLE_TIMEOUT, self.idle_timeout),
            (keys::MAX_LIFETIME, self.max_lifetime),
        ] {
            if value.is_zero() {
                return Err(DbError::configuration(key, "duration must be greater than 0"));
            }
        }
        Ok(())
    }

    /// Credential-free description of the target, safe for logs.
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Number of background worker threads requested by the configuration.
///
/// `None` means "let the runtime decide" (one per core).
pub fn worker_threads(config: &config::Config) -> DbResult<Option<usize>> {
    let threads: usize = read_int(config, keys::WORKER_THREADS, 0)?;
    Ok((threads > 0).then_some(threads))
}

fn read_string(config: &config::Config, key: &str, default: &str) -> DbResult<String> {
    match config.get_string(key) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(default.to_string()),
        Err(e) => Err(DbError::configuration(key, e.to_string())),
    }
}

fn read_bool(config: &config::Config, key: &str, default: bool) -> DbResult<bool> {
    match config.get_bool(key) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(default),
        Err(e) => Err(DbError::configuration(key, e.to_string())),
    }
}

fn read_int<T>(config: &config::Config, key: &str, default: T) -> DbResult<T>
where
    T: TryFrom<i64>,
{
    match config.get_int(key) {
        Ok(value) => T::try_from(value).map_err(|_| {
            DbError::configuration(key, format!("value {} is out of range", value))
        }),
        Err(config::ConfigError::NotFound(_)) => Ok(default),
        Err(e) => Err(DbError::configuration(key, e.to_string())),
    }
}

fn read_millis(config: &config::Config, key: &str, default_ms: u64) -> DbResult<Duration> {
    read_int(config, key, default_ms).map(Duration::from_millis)
}

/// Load a configuration file (format chosen by extension), layered with
/// `DATABASE_CORE_*` environment variables.
pub fn load_config(path: &Path) -> DbResult<config::Config> {
    let config = config::Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;
    Ok(config)
}

/// Parse configuration from an in-memory YAML document.
pub fn config_from_yaml(yaml: &str) -> DbResult<config::Config> {
    let config = config::Config::builder()
        .add_source(File::from_str(yaml, FileFormat::Yaml))
        .build()?;
    Ok(config)
}

/// Write [`DEFAULT_CONFIG_YAML`] to `path` unless a file already exists.
///
/// Returns `true` when a new file was written.
pub fn save_default_config(path: &Path) -> DbResult<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            DbError::configuration(
                "<file>",
                format!("Failed to create {}: {}", parent.display(), e),
            )
        })?;
    }
    std::fs::write(path, DEFAULT_CONFIG_YAML).map_err(|e| {
        DbError::configuration(
            "<file>",
            format!("Failed to write {}: {}", path.display(), e),
        )
    })?;
    Ok(true)
}

/// Command line of the demo host.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "database-core",
    about = "Pooled MySQL access layer - runs the bundled usage example against a live server",
    version,
    author
)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON). Written with defaults if missing.
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.yml",
        env = "DATABASE_CORE_CONFIG"
    )]
    pub config: PathBuf,

    /// Name of the player the example inserts and reads back
    #[arg(long, default_value = "Alice", env = "DATABASE_CORE_PLAYER")]
    pub player: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DATABASE_CORE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DATABASE_CORE_JSON_LOGS")]
    pub json_logs: bool,
}
