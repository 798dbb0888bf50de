//! Background execution pool.
//!
//! Database work runs on a dedicated multi-threaded tokio runtime, separate
//! from the threads of whoever calls into the layer. The connection pool is
//! also created and closed on this runtime so its maintenance tasks live here.

use super::TaskHandle;
use crate::error::{DbError, DbResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info};

/// Name given to every worker thread.
pub const WORKER_THREAD_NAME: &str = "database-core-worker";

/// How long a synchronous shutdown waits for running tasks.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A bounded pool of worker threads executing database tasks.
#[derive(Debug)]
pub struct WorkerPool {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    worker_threads: usize,
    closed: AtomicBool,
}

impl WorkerPool {
    /// Start a pool with `worker_threads` threads, or one per core for `None`.
    pub fn new(worker_threads: Option<usize>) -> DbResult<Self> {
        let worker_threads = worker_threads.filter(|n| *n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name(WORKER_THREAD_NAME)
            .enable_all()
            .build()
            .map_err(|e| DbError::internal(format!("Failed to start worker pool: {}", e)))?;

        debug!(worker_threads, "Worker pool started");

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            worker_threads,
            closed: AtomicBool::new(false),
        })
    }

    /// Start a pool sized by `async.worker-threads`.
    pub fn from_config(config: &config::Config) -> DbResult<Self> {
        Self::new(crate::config::worker_threads(config)?)
    }

    /// Submit a task. Never fails at the call site: submitting to a pool that
    /// has been shut down yields a handle that is already failed.
    pub fn spawn<T, F>(&self, future: F) -> TaskHandle<T>
    where
        F: Future<Output = DbResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return TaskHandle::failed(DbError::not_initialized("Worker pool has been shut down"));
        }
        TaskHandle::spawned(self.handle.spawn(future), self.handle.clone())
    }

    /// Run `future` on the pool and block the calling thread for its result.
    pub fn block_on<T, F>(&self, future: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn(future).wait()
    }

    /// Runtime handle of the pool.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the worker threads. Idempotent.
    ///
    /// From synchronous code this waits (bounded) for running tasks. Inside
    /// an async context it cannot block, so the runtime is released in the
    /// background. Tasks that had not finished resolve as failed.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
            }
            info!("Worker pool stopped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        let runtime = self
            .runtime
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}
