//! Integration tests against a running MySQL server.
//!
//! Set TEST_MYSQL_HOST to run them. TEST_MYSQL_PORT, TEST_MYSQL_DATABASE,
//! TEST_MYSQL_USER and TEST_MYSQL_PASSWORD default to 3306, "test", "root"
//! and an empty password.
//! Example: TEST_MYSQL_HOST=127.0.0.1 TEST_MYSQL_PASSWORD=root cargo test --test mysql_test

use database_core::{
    DatabaseApi, DatabaseCore, DatabaseService, DbError, Plugin, PluginContext, PoolStatus,
    ServiceRegistry, ServiceState, SqlValue, params,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct TestDb {
    plugin: DatabaseCore,
    ctx: PluginContext,
    db: Arc<DatabaseService>,
    table: String,
}

impl TestDb {
    /// Enable the plugin against the test server, or `None` when not configured.
    fn start(max_pool_size: i64, connection_timeout_ms: i64) -> Option<Self> {
        let host = match std::env::var("TEST_MYSQL_HOST") {
            Ok(host) => host,
            Err(_) => {
                eprintln!("Skipping test: TEST_MYSQL_HOST not set");
                return None;
            }
        };
        let env_or = |key: &str, default: &str| std::env::var(key).unwrap_or(default.to_string());
        let port: i64 = env_or("TEST_MYSQL_PORT", "3306").parse().unwrap();

        let config = config::Config::builder()
            .set_override("database.host", host)
            .unwrap()
            .set_override("database.port", port)
            .unwrap()
            .set_override("database.name", env_or("TEST_MYSQL_DATABASE", "test"))
            .unwrap()
            .set_override("database.username", env_or("TEST_MYSQL_USER", "root"))
            .unwrap()
            .set_override("database.password", env_or("TEST_MYSQL_PASSWORD", ""))
            .unwrap()
            .set_override("connection-pool.maximum-pool-size", max_pool_size)
            .unwrap()
            .set_override("connection-pool.minimum-idle", 0)
            .unwrap()
            .set_override("connection-pool.connection-timeout", connection_timeout_ms)
            .unwrap()
            .set_override("async.worker-threads", 4)
            .unwrap()
            .build()
            .unwrap();

        let ctx = PluginContext::new(config, Arc::new(ServiceRegistry::new()));
        let plugin = DatabaseCore::new();
        plugin.on_enable(&ctx).expect("Failed to enable DatabaseCore");
        let db = ctx
            .registry()
            .get::<DatabaseService>()
            .expect("DatabaseService was not published");

        let table = format!("players_{}", uuid::Uuid::new_v4().simple());
        Some(Self {
            plugin,
            ctx,
            db,
            table,
        })
    }

    fn create_players_table(&self) {
        let sql = format!(
            "CREATE TABLE {} (
                id INT AUTO_INCREMENT PRIMARY KEY,
                uuid VARCHAR(36) UNIQUE NOT NULL,
                name VARCHAR(16) NOT NULL,
                coins INT DEFAULT 0,
                vip TINYINT(1) DEFAULT 0,
                last_login TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            self.table
        );
        self.db
            .update(&sql, params![])
            .wait()
            .expect("Failed to create table");
    }

    /// Wait until every borrowed connection has gone back to the pool.
    fn wait_for_release(&self) -> PoolStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let status = self.db.pool_status().expect("pool is not ready");
            if status.in_use() == 0 || Instant::now() > deadline {
                return status;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn stop(self) {
        let _ = self
            .db
            .update(&format!("DROP TABLE IF EXISTS {}", self.table), params![])
            .wait();
        self.plugin.on_disable(&self.ctx);
    }
}

#[test]
fn test_mysql_players_scenario() {
    let Some(t) = TestDb::start(4, 5_000) else {
        return;
    };
    t.create_players_table();

    let upsert = format!(
        "INSERT INTO {} (uuid, name) VALUES (?, ?) ON DUPLICATE KEY UPDATE name = VALUES(name)",
        t.table
    );
    let affected = t.db.update(&upsert, params!["uuid-1", "Alice"]).wait().unwrap();
    assert_eq!(affected, 1);

    let select = format!("SELECT * FROM {} WHERE uuid = ?", t.table);
    let result = t.db.query(&select, params!["uuid-1"]).wait().unwrap();
    assert_eq!(result.row_count(), 1);
    assert_eq!(result.first_row()["name"], SqlValue::from("Alice"));
    assert_eq!(result.string_of("uuid").as_deref(), Some("uuid-1"));
    assert_eq!(result.int_of("coins"), 0);
    assert!(!result.bool_of("vip"));
    assert!(result.string_of("last_login").is_some());
    assert_eq!(
        result.column_names(),
        vec!["id", "uuid", "name", "coins", "vip", "last_login"]
    );

    let coins = format!("UPDATE {} SET coins = ?, vip = ? WHERE uuid = ?", t.table);
    assert_eq!(t.db.update(&coins, params![100, true, "uuid-1"]).wait().unwrap(), 1);
    assert_eq!(t.db.update(&coins, params![5, false, "missing"]).wait().unwrap(), 0);

    let result = t.db.query(&select, params!["uuid-1"]).wait().unwrap();
    assert_eq!(result.int_of("coins"), 100);
    assert_eq!(result.long_of("coins"), 100);
    assert!(result.bool_of("vip"));
    assert_eq!(result.int_of("missing_column"), 0);

    t.stop();
}

#[test]
fn test_mysql_empty_result_keeps_columns() {
    let Some(t) = TestDb::start(2, 5_000) else {
        return;
    };
    t.create_players_table();

    let result = t
        .db
        .query(
            &format!("SELECT uuid, name FROM {} WHERE uuid = ?", t.table),
            params!["nobody"],
        )
        .wait()
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(result.column_names(), vec!["uuid", "name"]);
    assert!(result.first_row().is_empty());
    assert_eq!(result.value_of("name"), None);

    t.stop();
}

#[test]
fn test_mysql_value_mapping() {
    let Some(t) = TestDb::start(2, 5_000) else {
        return;
    };

    let result = t
        .db
        .query(
            "SELECT 42 AS i, CAST(12.50 AS DECIMAL(10,2)) AS d, 1e0 AS f, 'text' AS s, \
             NULL AS n, CAST('2024-01-02' AS DATE) AS day, ? AS bound",
            params![None::<i64>],
        )
        .wait()
        .unwrap();

    assert_eq!(result.value_of("i"), Some(SqlValue::Int(42)));
    assert_eq!(result.value_of("d"), Some(SqlValue::Float(12.5)));
    assert_eq!(result.value_of("f"), Some(SqlValue::Float(1.0)));
    assert_eq!(result.string_of("s").as_deref(), Some("text"));
    assert_eq!(result.value_of("n"), None);
    assert_eq!(result.string_of("day").as_deref(), Some("2024-01-02"));
    assert_eq!(result.value_of("bound"), None);

    t.stop();
}

#[test]
fn test_mysql_statement_errors_are_delivered() {
    let Some(t) = TestDb::start(1, 2_000) else {
        return;
    };
    t.create_players_table();

    let err = t
        .db
        .query("SELEC broken sql", params![1])
        .wait()
        .unwrap_err();
    assert!(matches!(err, DbError::Operation { .. }));

    let insert = format!("INSERT INTO {} (uuid, name) VALUES (?, ?)", t.table);
    t.db.update(&insert, params!["dup", "First"]).wait().unwrap();
    let err = t
        .db
        .update(&insert, params!["dup", "Second"])
        .wait()
        .unwrap_err();
    assert_eq!(err.sql_state(), Some("23000"));

    // The single connection is still available afterwards
    assert_eq!(t.wait_for_release().in_use(), 0);
    assert!(t.db.health().wait().unwrap());

    t.stop();
}

#[test]
fn test_mysql_connection_released_after_failed_operation() {
    let Some(t) = TestDb::start(1, 2_000) else {
        return;
    };

    let result: Result<(), DbError> = t.db.execute(|conn| {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&mut *conn).await?;
            Err(DbError::internal("operation failed midway"))
        })
    });
    assert!(result.is_err());

    let status = t.wait_for_release();
    assert_eq!(status.in_use(), 0);
    assert_eq!(status.max_size, 1);

    // With a pool of one, this only succeeds if the connection came back
    let value = t
        .db
        .execute(|conn| {
            Box::pin(async move {
                let (one,): (i64,) = sqlx::query_as("SELECT 1").fetch_one(&mut *conn).await?;
                Ok(one)
            })
        })
        .unwrap();
    assert_eq!(value, 1);

    t.stop();
}

#[test]
fn test_mysql_concurrency_within_pool_size() {
    let Some(t) = TestDb::start(4, 5_000) else {
        return;
    };

    let started = Instant::now();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            t.db.execute_async(|conn| {
                Box::pin(async move {
                    sqlx::query("SELECT SLEEP(0.3)").execute(&mut *conn).await?;
                    Ok(())
                })
            })
        })
        .collect();

    for handle in handles {
        handle.wait().unwrap();
    }
    // Ran side by side rather than one after another
    assert!(started.elapsed() < Duration::from_millis(1_100));

    t.stop();
}

#[test]
fn test_mysql_excess_callers_wait_for_a_free_connection() {
    let Some(t) = TestDb::start(1, 5_000) else {
        return;
    };

    let handles: Vec<_> = (0..3)
        .map(|_| {
            t.db.execute_async(|conn| {
                Box::pin(async move {
                    sqlx::query("SELECT SLEEP(0.2)").execute(&mut *conn).await?;
                    Ok(())
                })
            })
        })
        .collect();

    for handle in handles {
        handle.wait().unwrap();
    }

    t.stop();
}

#[test]
fn test_mysql_excess_callers_time_out() {
    let Some(t) = TestDb::start(1, 500) else {
        return;
    };

    let holder = t.db.execute_async(|conn| {
        Box::pin(async move {
            sqlx::query("SELECT SLEEP(2)").execute(&mut *conn).await?;
            Ok(())
        })
    });
    // Let the holder take the only connection
    std::thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    let err = t
        .db
        .query("SELECT 1", params![])
        .wait()
        .unwrap_err();
    assert!(matches!(err, DbError::Connection { .. }));
    assert!(err.to_string().contains("500 ms"));
    assert!(started.elapsed() < Duration::from_secs(2));

    holder.wait().unwrap();
    t.stop();
}

#[test]
fn test_mysql_transaction_on_borrowed_connection() {
    let Some(t) = TestDb::start(2, 5_000) else {
        return;
    };
    t.create_players_table();

    let table = t.table.clone();
    let result: Result<(), DbError> = t.db.execute(move |conn| {
        Box::pin(async move {
            use sqlx::Connection;
            let mut tx = conn.begin().await?;
            sqlx::query(&format!("INSERT INTO {} (uuid, name) VALUES (?, ?)", table))
                .bind("tx-1")
                .bind("Rolled")
                .execute(&mut *tx)
                .await?;
            tx.rollback().await?;
            Ok(())
        })
    });
    result.unwrap();

    let count = t
        .db
        .query(&format!("SELECT COUNT(*) AS n FROM {}", t.table), params![])
        .wait()
        .unwrap();
    assert_eq!(count.long_of("n"), 0);

    t.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mysql_get_connection_and_release() {
    let Some(t) = TestDb::start(2, 5_000) else {
        return;
    };

    {
        let mut conn = t.db.get_connection().await.unwrap();
        let (one,): (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(one, 1);
        assert_eq!(t.db.pool_status().unwrap().in_use(), 1);
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while t.db.pool_status().unwrap().in_use() > 0 {
        assert!(Instant::now() < deadline, "connection was never released");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(t.db.health().await.unwrap());
    t.stop();
}

#[test]
fn test_mysql_is_connected_follows_the_pool() {
    let Some(t) = TestDb::start(2, 1_000) else {
        return;
    };

    let api = t
        .ctx
        .registry()
        .get::<dyn DatabaseApi>()
        .expect("DatabaseApi was not published");
    assert!(api.is_connected());
    assert_eq!(t.wait_for_release().in_use(), 0);

    // Closing the pool under a published service
    t.db.shutdown();
    assert!(!api.is_connected());
    assert!(!t.db.is_connected());

    t.plugin.on_disable(&t.ctx);
    assert!(t.ctx.registry().get::<dyn DatabaseApi>().is_none());
}

#[test]
fn test_mysql_multiple_result_sets() {
    let Some(t) = TestDb::start(2, 5_000) else {
        return;
    };

    let result = t
        .db
        .query("SELECT 1 AS a, 'x' AS label; SELECT 2 AS b", params![])
        .wait()
        .unwrap();
    assert_eq!(result.column_names(), vec!["a", "label"]);
    assert_eq!(result.row_count(), 2);
    assert_eq!(result.row_at(0)["a"], SqlValue::Int(1));

    let second = result.row_at(1);
    assert_eq!(second.len(), 1);
    assert_eq!(second["b"], SqlValue::Int(2));

    t.stop();
}

#[test]
fn test_mysql_double_shutdown() {
    let Some(t) = TestDb::start(2, 5_000) else {
        return;
    };
    assert!(t.db.is_connected());
    let db = Arc::clone(&t.db);

    t.plugin.on_disable(&t.ctx);
    t.plugin.on_disable(&t.ctx);
    db.shutdown();

    assert_eq!(db.state(), ServiceState::Closed);
    assert!(!db.is_connected());
    assert!(t.ctx.registry().get::<DatabaseService>().is_none());
    assert!(db.query("SELECT 1", params![]).wait().is_err());
}
