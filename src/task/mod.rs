//! Background task execution.
//!
//! - `WorkerPool`: dedicated runtime that runs database work off caller threads
//! - `TaskHandle`: awaitable / waitable / callback handle to one task

mod handle;
mod pool;

pub use handle::TaskHandle;
pub use pool::{WORKER_THREAD_NAME, WorkerPool};
