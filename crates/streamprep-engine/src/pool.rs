//! Fixed-size task pool owned by one pipeline.
//!
//! Concurrency is bounded by a semaphore sized at construction. Tasks queued
//! behind the semaphore wait for a permit; they are never rejected.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::TaskError;

pub(crate) struct WorkerPool {
    name: String,
    size: usize,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub(crate) fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Number of tasks submitted and not yet finished.
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Queue `task` on the pool. The task starts once a permit is free and is
    /// dropped at its next await point if the pool is force-cancelled.
    pub(crate) fn submit<F>(&self, task: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();
        let inner = self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                output = async move {
                    let _permit = permits.acquire_owned().await.ok()?;
                    Some(task.await)
                } => output,
            }
        });
        TaskHandle { inner }
    }

    /// Wait up to `timeout` for every submitted task to finish, then cancel
    /// whatever is left. Returns `true` when everything finished in time.
    pub(crate) async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            tracing::debug!(pool = %self.name, "All pool tasks finished");
            return true;
        }
        tracing::warn!(
            pool = %self.name,
            remaining = self.tracker.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "Pool tasks still running at shutdown deadline, cancelling"
        );
        self.cancel.cancel();
        false
    }
}

/// Pending result of a task submitted to a [`WorkerPool`].
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle<T> {
    inner: JoinHandle<Option<T>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx).map(|joined| match joined {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(TaskError::Cancelled),
            Err(err) if err.is_panic() => Err(TaskError::Panicked(panic_message(err.into_panic()))),
            Err(_) => Err(TaskError::Cancelled),
        })
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
