//! Host lifecycle glue.
//!
//! The host drives a [`Plugin`] through `on_enable` / `on_disable`. The
//! [`DatabaseCore`] plugin owns the worker pool and the connection pool for
//! the lifetime between those two calls, and publishes its
//! [`DatabaseService`] in the host's [`ServiceRegistry`] while enabled.

use crate::api::{DatabaseApi, DatabaseService};
use crate::db::DatabaseManager;
use crate::error::{DbError, DbResult};
use crate::registry::{ServicePriority, ServiceRegistry};
use crate::task::WorkerPool;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

/// Owner name used for registry entries.
pub const PLUGIN_NAME: &str = "DatabaseCore";

/// What the host hands a plugin at each lifecycle point.
#[derive(Debug, Clone)]
pub struct PluginContext {
    config: config::Config,
    registry: Arc<ServiceRegistry>,
}

impl PluginContext {
    pub fn new(config: config::Config, registry: Arc<ServiceRegistry>) -> Self {
        Self { config, registry }
    }

    /// Key-value configuration loaded by the host.
    pub fn config(&self) -> &config::Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }
}

/// A component the host can enable and disable.
pub trait Plugin: Send + Sync {
    /// Plugin name
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Start the plugin. An error tells the host to keep it disabled.
    fn on_enable(&self, ctx: &PluginContext) -> DbResult<()>;

    /// Stop the plugin. Must be safe to call repeatedly and after a failed enable.
    fn on_disable(&self, ctx: &PluginContext);
}

/// The database plugin.
#[derive(Debug, Default)]
pub struct DatabaseCore {
    service: Mutex<Option<Arc<DatabaseService>>>,
}

impl DatabaseCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The published service, while enabled.
    pub fn service(&self) -> Option<Arc<DatabaseService>> {
        self.service
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Plugin for DatabaseCore {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn on_enable(&self, ctx: &PluginContext) -> DbResult<()> {
        let mut slot = self.service.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("DatabaseCore is already enabled");
            return Ok(());
        }

        let workers = Arc::new(WorkerPool::from_config(ctx.config())?);
        let manager = Arc::new(DatabaseManager::new());

        let config = ctx.config().clone();
        let init = Arc::clone(&manager);
        let initialized = workers
            .block_on(async move { Ok(init.initialize(&config).await) })
            .unwrap_or(false);

        if !initialized {
            error!("Failed to initialize database connection! Disabling plugin...");
            workers.shutdown();
            return Err(DbError::connection(
                "Failed to initialize database connection",
                "Check the database settings and that the server is reachable",
            ));
        }

        let service = Arc::new(DatabaseService::new(manager, workers));
        let capability: Arc<dyn DatabaseApi> = service.clone();
        ctx.registry()
            .register(capability, PLUGIN_NAME, ServicePriority::High);
        ctx.registry()
            .register(Arc::clone(&service), PLUGIN_NAME, ServicePriority::High);
        *slot = Some(service);

        info!("DatabaseCore has been enabled successfully");
        info!("Other components can now discover DatabaseService through the service registry");
        Ok(())
    }

    fn on_disable(&self, ctx: &PluginContext) {
        let service = self
            .service
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(service) = service {
            let capability: Arc<dyn DatabaseApi> = service.clone();
            ctx.registry().unregister(&capability);
            ctx.registry().unregister(&service);
            service.shutdown();
            service.workers().shutdown();
            info!("DatabaseCore has been disabled");
        }
    }
}
