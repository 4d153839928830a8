//! Default bounded buffer (`bounded_blocking`).

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use streamprep_sdk::Buffer;
use streamprep_types::{BufferError, PluginSetting, Record};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

/// Registry type-name of [`BlockingBuffer`].
pub const BLOCKING_BUFFER_TYPE: &str = "bounded_blocking";

pub const DEFAULT_BUFFER_SIZE: usize = 512;
pub const DEFAULT_BATCH_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockingBufferConfig {
    #[serde(default = "default_buffer_size")]
    buffer_size: usize,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Bounded FIFO backed by a tokio channel.
///
/// Readers serialize on the receiver, so each record is handed to exactly one
/// `read` call.
pub struct BlockingBuffer {
    sender: mpsc::Sender<Record>,
    receiver: Mutex<mpsc::Receiver<Record>>,
    batch_size: usize,
}

impl BlockingBuffer {
    /// # Panics
    ///
    /// Panics if `buffer_size` or `batch_size` is zero; use
    /// [`BlockingBuffer::from_setting`] for unchecked input.
    pub fn new(buffer_size: usize, batch_size: usize) -> Self {
        assert!(buffer_size > 0, "buffer_size must be at least 1");
        assert!(batch_size > 0, "batch_size must be at least 1");
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            batch_size,
        }
    }

    /// Build from a `bounded_blocking` plugin setting.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown settings or a zero size.
    pub fn from_setting(setting: &PluginSetting) -> Result<Self> {
        let config: BlockingBufferConfig = setting.deserialize_settings()?;
        if config.buffer_size == 0 {
            bail!("buffer_size must be at least 1");
        }
        if config.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        Ok(Self::new(config.buffer_size, config.batch_size))
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Default for BlockingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_BATCH_SIZE)
    }
}

#[async_trait]
impl Buffer for BlockingBuffer {
    async fn write(&self, record: Record, timeout: Duration) -> Result<(), BufferError> {
        match self.sender.send_timeout(record, timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => Err(BufferError::Timeout(timeout)),
            Err(mpsc::error::SendTimeoutError::Closed(_)) => Err(BufferError::Closed),
        }
    }

    async fn read(&self, timeout: Duration) -> Vec<Record> {
        let deadline = Instant::now() + timeout;
        let Ok(mut receiver) = tokio::time::timeout_at(deadline, self.receiver.lock()).await else {
            return Vec::new();
        };

        let mut records = Vec::with_capacity(self.batch_size);
        while records.len() < self.batch_size {
            match tokio::time::timeout_at(deadline, receiver.recv()).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) | Err(_) => break,
            }
            while records.len() < self.batch_size {
                match receiver.try_recv() {
                    Ok(record) => records.push(record),
                    Err(_) => break,
                }
            }
        }
        records
    }

    fn is_empty(&self) -> bool {
        self.sender.capacity() == self.sender.max_capacity()
    }
}
