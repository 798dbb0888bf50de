//! Handle to a background database task.

use crate::error::{DbError, DbResult};
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc;
use std::task::{Context, Poll};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::{JoinError, JoinHandle};

/// The eventual result of a task submitted to a [`WorkerPool`](super::WorkerPool).
///
/// A handle can be awaited, waited on from synchronous code, or given a
/// completion callback. Every outcome, including a panic inside the task,
/// arrives as a `DbResult`. Dropping the handle detaches the task; it keeps
/// running to completion.
#[must_use = "a TaskHandle does nothing unless awaited, waited on or given a callback"]
pub struct TaskHandle<T> {
    state: State<T>,
}

enum State<T> {
    Running {
        join: JoinHandle<DbResult<T>>,
        runtime: Handle,
    },
    /// Failed before it could run. `None` once the error has been handed out.
    Failed(Option<DbError>),
}

impl<T> TaskHandle<T> {
    pub(crate) fn spawned(join: JoinHandle<DbResult<T>>, runtime: Handle) -> Self {
        Self {
            state: State::Running { join, runtime },
        }
    }

    /// A handle that is already complete with `error`.
    pub fn failed(error: DbError) -> Self {
        Self {
            state: State::Failed(Some(error)),
        }
    }

    fn runtime(&self) -> Option<Handle> {
        match &self.state {
            State::Running { runtime, .. } => Some(runtime.clone()),
            State::Failed(_) => None,
        }
    }

    /// True once the result is available without waiting.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            State::Running { join, .. } => join.is_finished(),
            State::Failed(_) => true,
        }
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Block the current thread until the task completes.
    ///
    /// Works from plain threads and from threads owned by other runtimes. On
    /// a multi-threaded runtime worker the wait is moved off the scheduler
    /// with `block_in_place`; prefer `.await` there.
    pub fn wait(self) -> DbResult<T> {
        let Some(runtime) = self.runtime() else {
            return take_failure(self.state);
        };

        let (tx, rx) = mpsc::sync_channel(1);
        runtime.spawn(async move {
            let _ = tx.send(self.await);
        });

        let recv = move || {
            rx.recv().unwrap_or_else(|_| {
                Err(DbError::not_initialized(
                    "Worker pool shut down before the task completed",
                ))
            })
        };

        match Handle::try_current() {
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(recv)
            }
            _ => recv(),
        }
    }

    /// Run `callback` with the result once the task completes.
    ///
    /// Returns immediately. The callback runs on a worker thread, or inline
    /// when the handle had already failed at submission.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(DbResult<T>) + Send + 'static,
    {
        match self.runtime() {
            Some(runtime) => {
                runtime.spawn(async move { callback(self.await) });
            }
            None => callback(take_failure(self.state)),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = DbResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            State::Running { join, .. } => Pin::new(join).poll(cx).map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(join_error(e)),
            }),
            State::Failed(error) => Poll::Ready(Err(error
                .take()
                .unwrap_or_else(|| DbError::internal("Task result was already taken")))),
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn take_failure<T>(state: State<T>) -> DbResult<T> {
    match state {
        State::Failed(Some(error)) => Err(error),
        _ => Err(DbError::internal("Task result was already taken")),
    }
}

fn join_error(err: JoinError) -> DbError {
    if err.is_panic() {
        DbError::internal(format!(
            "Background task panicked: {}",
            panic_message(err.into_panic())
        ))
    } else {
        DbError::not_initialized("Background task was cancelled because the worker pool shut down")
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_handle_is_finished() {
        let handle: TaskHandle<u32> = TaskHandle::failed(DbError::internal("boom"));
        assert!(handle.is_finished());
        let err = handle.wait().unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_failed_handle_callback_runs_inline() {
        let handle: TaskHandle<u32> = TaskHandle::failed(DbError::not_initialized("closed"));
        let (tx, rx) = mpsc::channel();
        handle.on_complete(move |result| {
            tx.send(result.is_err()).unwrap();
        });
        assert!(rx.try_recv().unwrap());
    }

    #[tokio::test]
    async fn test_failed_handle_await() {
        let handle: TaskHandle<u32> = TaskHandle::failed(DbError::internal("boom"));
        assert!(matches!(handle.await, Err(DbError::Internal { .. })));
    }

    #[test]
    fn test_failed_handle_ready_on_first_poll() {
        let mut task = tokio_test::task::spawn(TaskHandle::<u32>::failed(DbError::internal("boom")));
        let result = tokio_test::assert_ready!(task.poll());
        assert!(result.is_err());
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
