//! Lifecycle tests that need no database server.
//!
//! These cover startup failure handling, use before initialization and after
//! shutdown, configuration files, and service discovery.

use database_core::config::{PoolSettings, load_config, save_default_config};
use database_core::{
    DatabaseApi, DatabaseCore, DatabaseManager, DatabaseService, DbError, Plugin, PluginContext,
    ServicePriority, ServiceRegistry, ServiceState, WorkerPool, params,
};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn unreachable_config() -> config::Config {
    config::Config::builder()
        .set_override("database.host", "127.0.0.1")
        .unwrap()
        .set_override("database.port", 1)
        .unwrap()
        .set_override("connection-pool.minimum-idle", 0)
        .unwrap()
        .set_override("connection-pool.connection-timeout", 300)
        .unwrap()
        .set_override("async.worker-threads", 2)
        .unwrap()
        .build()
        .unwrap()
}

fn uninitialized_service() -> DatabaseService {
    DatabaseService::new(
        Arc::new(DatabaseManager::new()),
        Arc::new(WorkerPool::new(Some(2)).unwrap()),
    )
}

#[test]
fn test_failed_startup_publishes_nothing() {
    let registry = Arc::new(ServiceRegistry::new());
    let ctx = PluginContext::new(unreachable_config(), Arc::clone(&registry));
    let plugin = DatabaseCore::new();

    assert!(plugin.on_enable(&ctx).is_err());
    assert!(registry.get::<DatabaseService>().is_none());
    assert!(plugin.service().is_none());

    plugin.on_disable(&ctx);
}

#[tokio::test]
async fn test_get_connection_before_initialize_is_an_error() {
    let db = uninitialized_service();
    match db.get_connection().await {
        Err(e) => {
            assert!(matches!(e, DbError::NotInitialized { .. }));
            assert!(e.is_connection_error());
        }
        Ok(_) => panic!("acquired a connection from an uninitialized pool"),
    }
}

#[test]
fn test_many_callers_fail_fast_before_initialize() {
    let db = Arc::new(uninitialized_service());

    let callers: Vec<_> = (0..8)
        .map(|i| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let by_execute = db.execute(|_conn| Box::pin(async move { Ok(()) }));
                let by_query = db
                    .query("SELECT * FROM players WHERE id = ?", params![i])
                    .wait();
                (by_execute.is_err(), by_query.is_err())
            })
        })
        .collect();

    for caller in callers {
        assert_eq!(caller.join().unwrap(), (true, true));
    }
}

#[test]
fn test_operations_after_shutdown_fail() {
    let db = uninitialized_service();
    db.shutdown();
    db.shutdown();

    assert_eq!(db.state(), ServiceState::Closed);
    assert!(!db.is_connected());

    let err = db
        .update("UPDATE players SET coins = ? WHERE uuid = ?", params![1, "uuid-1"])
        .wait()
        .unwrap_err();
    assert!(err.is_connection_error());
}

#[tokio::test]
async fn test_handles_can_be_awaited() {
    let db = uninitialized_service();
    let err = db.query("SELECT 1", params![]).await.unwrap_err();
    assert!(matches!(err, DbError::NotInitialized { .. }));
    assert!(!db.health().await.unwrap());
}

#[test]
fn test_default_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("DatabaseCore").join("config.yml");

    assert!(save_default_config(&path).unwrap());
    let settings = PoolSettings::from_config(&load_config(&path).unwrap()).unwrap();

    assert_eq!(settings.target(), "localhost:3306/minecraft");
    assert_eq!(settings.username, "root");
    assert_eq!(settings.max_pool_size, 10);
    assert_eq!(settings.min_idle, 5);
    assert_eq!(settings.connection_timeout.as_millis(), 30_000);
    assert_eq!(settings.idle_timeout.as_millis(), 600_000);
    assert_eq!(settings.max_lifetime.as_millis(), 1_800_000);
}

#[test]
fn test_discovery_prefers_higher_priority() {
    let registry = ServiceRegistry::new();
    let fallback = Arc::new(uninitialized_service());
    let primary = Arc::new(uninitialized_service());

    registry.register(Arc::clone(&fallback), "Fallback", ServicePriority::Low);
    registry.register(Arc::clone(&primary), "DatabaseCore", ServicePriority::High);

    let found = registry.get::<DatabaseService>().unwrap();
    assert!(Arc::ptr_eq(&found, &primary));

    assert_eq!(registry.unregister_all("DatabaseCore"), 1);
    let found = registry.get::<DatabaseService>().unwrap();
    assert!(Arc::ptr_eq(&found, &fallback));
}
