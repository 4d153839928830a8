//! Async capability traits for pipeline components.
//!
//! All traits are object safe (via `async_trait`) so the engine can keep
//! heterogeneous, ordered stage lists as `Vec<Arc<dyn _>>`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use streamprep_types::{BufferError, Record};

/// Bounded hand-off queue between a source and the pipeline's workers.
///
/// Implementations must tolerate one producer running concurrently with many
/// readers, and must deliver every accepted record to exactly one `read` call.
#[async_trait]
pub trait Buffer: Send + Sync {
    /// Write one record, waiting up to `timeout` for capacity.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Timeout`] if no capacity became available in time.
    async fn write(&self, record: Record, timeout: Duration) -> Result<(), BufferError>;

    /// Collect whatever records become available within `timeout`.
    ///
    /// May return early once a batch threshold is reached. Never waits past
    /// `timeout`; an empty vector means nothing arrived.
    async fn read(&self, timeout: Duration) -> Vec<Record>;

    /// `true` when no accepted record is waiting to be read.
    fn is_empty(&self) -> bool;
}

/// Ingress component producing records into a [`Buffer`].
#[async_trait]
pub trait Source: Send + Sync {
    /// Begin ingestion into `buffer`. Long-running ingestion should be spawned
    /// so this returns promptly.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot begin ingesting; the owning
    /// pipeline is then abandoned.
    async fn start(&self, buffer: Arc<dyn Buffer>) -> anyhow::Result<()>;

    /// Halt ingestion. Calling this more than once has no further effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the source could not stop cleanly.
    fn stop(&self) -> anyhow::Result<()>;
}

/// Transform stage mapping one batch to a new batch.
///
/// A prepper may drop, rewrite or resize the batch, but never mutates its input.
pub trait Prepper: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the batch cannot be transformed.
    fn execute(&self, records: &[Record]) -> anyhow::Result<Vec<Record>>;

    /// Signal that shutdown has begun so buffered state can be flushed.
    fn prepare_for_shutdown(&self) {}

    /// `true` once the prepper holds no state that still needs flushing.
    fn is_ready_for_shutdown(&self) -> bool {
        true
    }

    /// Release resources.
    ///
    /// # Errors
    ///
    /// Returns an error if resources could not be released.
    fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Egress component delivering a batch outside the pipeline.
#[async_trait]
pub trait Sink: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the batch could not be delivered. Retrying is the
    /// sink's own concern.
    async fn output(&self, records: &[Record]) -> anyhow::Result<()>;

    /// Release resources.
    ///
    /// # Errors
    ///
    /// Returns an error if resources could not be released.
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
