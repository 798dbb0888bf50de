//! Database Core - demo host.
//!
//! Plays the part of a plugin host: loads the configuration, enables the
//! `DatabaseCore` plugin, then acts as a second component that discovers the
//! database service through the registry and works with a `players` table.

use clap::Parser;
use database_core::config::{Cli, load_config, save_default_config};
use database_core::{
    DatabaseApi, DatabaseCore, DatabaseService, DbResult, Plugin, PluginContext, ServiceRegistry,
    params,
};
use std::sync::{Arc, mpsc};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli);

    info!("Starting database-core v{}", env!("CARGO_PKG_VERSION"));

    if save_default_config(&cli.config)? {
        info!(path = %cli.config.display(), "Wrote default configuration");
    }
    let config = load_config(&cli.config)?;

    let registry = ServiceRegistry::global();
    let ctx = PluginContext::new(config, Arc::clone(&registry));
    let plugin = DatabaseCore::new();

    if let Err(e) = plugin.on_enable(&ctx) {
        error!(plugin = plugin.name(), error = %e, "Plugin could not be enabled");
        plugin.on_disable(&ctx);
        return Err(e.into());
    }

    let result = run_example(&registry, &cli.player);
    plugin.on_disable(&ctx);
    result.map_err(Into::into)
}

/// What a consuming component would do with the published service.
fn run_example(registry: &ServiceRegistry, player: &str) -> DbResult<()> {
    let Some(db) = registry.get::<DatabaseService>() else {
        warn!("DatabaseService not found! Make sure DatabaseCore is enabled.");
        return Ok(());
    };
    let db: &DatabaseService = &db;

    create_player_table(db)?;

    let uuid = uuid::Uuid::new_v4().to_string();
    insert_player(db, &uuid, player)?;
    update_player_coins(db, &uuid, 100)?;
    get_player(db, &uuid);

    let total = count_players(db)?;
    info!(total, "Players in table");

    if let Some(status) = db.pool_status() {
        info!(
            size = status.size,
            idle = status.idle,
            max = status.max_size,
            "Pool status"
        );
    }
    Ok(())
}

fn create_player_table<A: DatabaseApi>(db: &A) -> DbResult<()> {
    let sql = r#"
        CREATE TABLE IF NOT EXISTS players (
            id INT AUTO_INCREMENT PRIMARY KEY,
            uuid VARCHAR(36) UNIQUE NOT NULL,
            name VARCHAR(16) NOT NULL,
            coins INT DEFAULT 0,
            last_login TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
    "#;

    db.update(sql, params![]).wait()?;
    info!("Players table created/verified");
    Ok(())
}

fn insert_player<A: DatabaseApi>(db: &A, uuid: &str, name: &str) -> DbResult<()> {
    let sql =
        "INSERT INTO players (uuid, name) VALUES (?, ?) ON DUPLICATE KEY UPDATE name = VALUES(name)";

    let affected = db.update(sql, params![uuid, name]).wait()?;
    info!(player = name, affected, "Player saved to database");
    Ok(())
}

fn update_player_coins<A: DatabaseApi>(db: &A, uuid: &str, coins: i32) -> DbResult<()> {
    let sql = "UPDATE players SET coins = ? WHERE uuid = ?";

    if db.update(sql, params![coins, uuid]).wait()? > 0 {
        info!(coins, "Updated coins for player");
    } else {
        info!("Player not found");
    }
    Ok(())
}

/// Asynchronous read: the result is handled in a completion callback.
fn get_player<A: DatabaseApi>(db: &A, uuid: &str) {
    let sql = "SELECT * FROM players WHERE uuid = ?";
    let (done_tx, done_rx) = mpsc::channel();

    db.query(sql, params![uuid]).on_complete(move |result| {
        match result {
            Ok(rows) if !rows.is_empty() => {
                info!(
                    name = %rows.string_of("name").unwrap_or_default(),
                    coins = rows.int_of("coins"),
                    "Player found"
                );
                if let Ok(json) = serde_json::to_string(&rows.first_row()) {
                    info!(row = %json, "Player row");
                }
            }
            Ok(_) => info!("Player not found"),
            Err(e) => error!(error = %e, "Player lookup failed"),
        }
        let _ = done_tx.send(());
    });

    if done_rx.recv_timeout(Duration::from_secs(30)).is_err() {
        warn!("Player lookup did not complete in time");
    }
}

/// Synchronous operation on a borrowed connection.
fn count_players<A: DatabaseApi>(db: &A) -> DbResult<i64> {
    db.execute(|conn| {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM players")
                .fetch_one(&mut *conn)
                .await?;
            Ok(count)
        })
    })
}
