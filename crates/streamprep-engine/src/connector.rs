//! Inter-pipeline connector.
//!
//! One `PipelineConnector` instance is installed as a sink in every upstream
//! pipeline that targets a downstream pipeline, and as that downstream
//! pipeline's source. Records written through the sink side land directly in
//! the downstream buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use streamprep_sdk::{Buffer, Sink, Source};
use streamprep_types::{BufferError, Record};

/// Reserved plugin type-name marking an inter-pipeline edge.
pub const PIPELINE_TYPE: &str = "pipeline";

/// Setting naming the pipeline at the other end of an edge.
pub const PIPELINE_NAME_ATTRIBUTE: &str = "name";

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct PipelineConnector {
    target: String,
    upstreams: Mutex<Vec<String>>,
    buffer: Mutex<Option<Arc<dyn Buffer>>>,
    stopped: AtomicBool,
}

impl PipelineConnector {
    /// Create a connector feeding the pipeline named `target`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            upstreams: Mutex::new(Vec::new()),
            buffer: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Name of the downstream pipeline whose source this connector is.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Record that `pipeline` publishes into this connector.
    pub fn add_upstream(&self, pipeline: impl Into<String>) {
        let pipeline = pipeline.into();
        let mut upstreams = self.upstreams.lock().unwrap_or_else(PoisonError::into_inner);
        if !upstreams.contains(&pipeline) {
            upstreams.push(pipeline);
        }
    }

    /// Names of the pipelines publishing into this connector, in
    /// registration order.
    pub fn upstreams(&self) -> Vec<String> {
        self.upstreams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::Acquire) && self.current_buffer().is_some()
    }

    fn current_buffer(&self) -> Option<Arc<dyn Buffer>> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for PipelineConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConnector")
            .field("target", &self.target)
            .field("upstreams", &self.upstreams())
            .field("active", &self.is_active())
            .finish()
    }
}

#[async_trait]
impl Source for PipelineConnector {
    async fn start(&self, buffer: Arc<dyn Buffer>) -> Result<()> {
        *self.buffer.lock().unwrap_or_else(PoisonError::into_inner) = Some(buffer);
        self.stopped.store(false, Ordering::Release);
        tracing::debug!(pipeline = %self.target, "Pipeline connector started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl Sink for PipelineConnector {
    async fn output(&self, records: &[Record]) -> Result<()> {
        let Some(buffer) = self.current_buffer() else {
            bail!("pipeline [{}] is not active, cannot proceed", self.target);
        };
        for record in records {
            loop {
                if self.stopped.load(Ordering::Acquire) {
                    bail!("pipeline [{}] is not active, cannot proceed", self.target);
                }
                match buffer.write(record.clone(), WRITE_TIMEOUT).await {
                    Ok(()) => break,
                    Err(BufferError::Timeout(_)) => {
                        tracing::warn!(
                            pipeline = %self.target,
                            "Timed out writing to downstream pipeline buffer, retrying"
                        );
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }
}
