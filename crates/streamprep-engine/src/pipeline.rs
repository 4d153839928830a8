//! Pipeline execution unit.
//!
//! A [`Pipeline`] owns one source, one buffer, an ordered prepper chain, a list
//! of sinks and a fixed-size [`WorkerPool`]. `execute` starts the source and the
//! workers; `shutdown` tears everything down exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use streamprep_sdk::{Buffer, Prepper, Sink, Source};
use streamprep_types::Record;
use tokio::time::Instant;

use crate::error::PipelineError;
use crate::pool::{TaskHandle, WorkerPool};
use crate::worker::ProcessWorker;

/// Default grace period for in-flight workers during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Pending delivery of one batch to one sink.
pub type SinkHandle = TaskHandle<anyhow::Result<()>>;

/// Cheaply cloneable handle to a pipeline.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    name: String,
    source: Arc<dyn Source>,
    buffer: Arc<dyn Buffer>,
    preppers: Vec<Arc<dyn Prepper>>,
    sinks: Vec<Arc<dyn Sink>>,
    workers: usize,
    read_batch_timeout: Duration,
    pool: WorkerPool,
    stop_requested: AtomicBool,
    shutdown_started: AtomicBool,
}

impl Pipeline {
    /// Assemble a pipeline. The pool holds `workers` slots for the worker
    /// loops plus one per sink, so sink fan-out submitted from a worker can
    /// always make progress.
    ///
    /// # Panics
    ///
    /// Panics if `workers` is zero, `sinks` is empty or the timeout is zero;
    /// the graph builder validates these before construction.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn Source>,
        buffer: Arc<dyn Buffer>,
        preppers: Vec<Arc<dyn Prepper>>,
        sinks: Vec<Arc<dyn Sink>>,
        workers: usize,
        read_batch_timeout: Duration,
    ) -> Self {
        assert!(workers >= 1, "a pipeline needs at least one worker");
        assert!(!sinks.is_empty(), "a pipeline needs at least one sink");
        assert!(
            !read_batch_timeout.is_zero(),
            "read batch timeout must be positive"
        );
        let name = name.into();
        let pool = WorkerPool::new(format!("{name}-process-worker"), sinks.len() + workers);
        Self {
            inner: Arc::new(PipelineInner {
                name,
                source,
                buffer,
                preppers,
                sinks,
                workers,
                read_batch_timeout,
                pool,
                stop_requested: AtomicBool::new(false),
                shutdown_started: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.inner.source
    }

    pub fn buffer(&self) -> &Arc<dyn Buffer> {
        &self.inner.buffer
    }

    pub fn preppers(&self) -> &[Arc<dyn Prepper>] {
        &self.inner.preppers
    }

    pub fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.inner.sinks
    }

    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    pub fn read_batch_timeout(&self) -> Duration {
        self.inner.read_batch_timeout
    }

    /// Total pool slots: `sinks + workers`.
    pub fn pool_size(&self) -> usize {
        self.inner.pool.size()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::Acquire)
    }

    /// Start the source against the buffer, then submit the worker loops.
    ///
    /// Returns without waiting for any record to flow. A source that fails to
    /// start abandons this pipeline only; it is logged and not retried.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SourceStart`] if the source failed to start.
    pub async fn execute(&self) -> Result<(), PipelineError> {
        let name = self.name();
        tracing::info!(pipeline = %name, "Initiating pipeline execution");
        if let Err(source) = self.inner.source.start(Arc::clone(&self.inner.buffer)).await {
            tracing::error!(
                pipeline = %name,
                error = format!("{source:#}"),
                "Encountered error while starting the source, skipping execution"
            );
            return Err(PipelineError::SourceStart {
                pipeline: name.to_string(),
                source,
            });
        }

        tracing::info!(
            pipeline = %name,
            workers = self.inner.workers,
            pool_size = self.pool_size(),
            "Submitting process workers"
        );
        for id in 0..self.inner.workers {
            let worker = ProcessWorker::new(self.clone(), id);
            // Worker handles are not awaited; the pool tracks them for shutdown.
            drop(self.inner.pool.submit(worker.run()));
        }
        Ok(())
    }

    /// Submit one delivery task per sink and return their handles in sink
    /// order. Sinks are independent: one failing does not affect the others.
    pub fn publish_to_sinks(&self, records: Vec<Record>) -> Vec<SinkHandle> {
        let records: Arc<[Record]> = records.into();
        self.inner
            .sinks
            .iter()
            .map(|sink| {
                let sink = Arc::clone(sink);
                let records = Arc::clone(&records);
                self.inner
                    .pool
                    .submit(async move { sink.output(&records).await })
            })
            .collect()
    }

    /// Shut down with [`DEFAULT_SHUTDOWN_TIMEOUT`].
    pub async fn shutdown_default(&self) {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT).await;
    }

    /// Stop the source, request the workers to drain, run prepper and sink
    /// shutdown hooks, then wait for the pool before cancelling what is left.
    /// The sink hooks and the pool wait together take at most `timeout`; a
    /// sink hook still running at the deadline is abandoned. Failures are
    /// logged, never returned.
    pub async fn shutdown(&self, timeout: Duration) {
        let name = self.name();
        if self.inner.shutdown_started.swap(true, Ordering::AcqRel) {
            tracing::warn!(pipeline = %name, "Shutdown already initiated, ignoring");
            return;
        }
        tracing::info!(
            pipeline = %name,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "Received shutdown signal, initiating shutdown"
        );
        // Sink hooks and the worker wait share one deadline.
        let deadline = Instant::now() + timeout;

        if let Err(e) = self.inner.source.stop() {
            tracing::error!(
                pipeline = %name,
                error = format!("{e:#}"),
                "Encountered error while stopping the source, proceeding with shutdown"
            );
        }

        self.inner.stop_requested.store(true, Ordering::Release);
        for prepper in &self.inner.preppers {
            prepper.prepare_for_shutdown();
        }

        for (index, prepper) in self.inner.preppers.iter().enumerate() {
            if let Err(e) = prepper.shutdown() {
                tracing::error!(
                    pipeline = %name,
                    prepper = index,
                    error = format!("{e:#}"),
                    "Prepper shutdown failed"
                );
            }
        }
        for (index, sink) in self.inner.sinks.iter().enumerate() {
            match tokio::time::timeout_at(deadline, sink.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(
                    pipeline = %name,
                    sink = index,
                    error = format!("{e:#}"),
                    "Sink shutdown failed"
                ),
                Err(_) => tracing::error!(
                    pipeline = %name,
                    sink = index,
                    "Sink shutdown did not finish before the shutdown deadline"
                ),
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        tracing::info!(
            pipeline = %name,
            remaining_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
            "Shutting down process workers"
        );
        if self.inner.pool.shutdown(remaining).await {
            tracing::info!(pipeline = %name, "Pipeline shut down cleanly");
        } else {
            tracing::warn!(pipeline = %name, "Pipeline workers force-cancelled after timeout");
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.inner.name)
            .field("preppers", &self.inner.preppers.len())
            .field("sinks", &self.inner.sinks.len())
            .field("workers", &self.inner.workers)
            .field("read_batch_timeout", &self.inner.read_batch_timeout)
            .field("stop_requested", &self.is_stop_requested())
            .finish_non_exhaustive()
    }
}
