//! Built-in sinks writing one JSON document per line.

use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;
use streamprep_sdk::prelude::*;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

pub const STDOUT: &str = "stdout";
pub const FILE: &str = "file";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSinkConfig {
    path: PathBuf,
    /// Truncate instead of appending when the file already exists.
    #[serde(default)]
    truncate: bool,
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Serializes each record's data as a JSON line into a writer.
///
/// Batches are written under one lock, so lines from concurrent batches never
/// interleave.
pub struct JsonLinesSink {
    pipeline: String,
    target: String,
    writer: Mutex<Writer>,
}

impl JsonLinesSink {
    fn new(setting: &PluginSetting, target: impl Into<String>, writer: Writer) -> Self {
        Self {
            pipeline: setting.pipeline_name().unwrap_or_default().to_string(),
            target: target.into(),
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout(setting: &PluginSetting) -> Self {
        Self::new(setting, STDOUT, Box::new(tokio::io::stdout()))
    }

    /// # Errors
    ///
    /// Fails if the settings are invalid or the file cannot be opened.
    pub fn file(setting: &PluginSetting) -> anyhow::Result<Self> {
        let config: FileSinkConfig = setting
            .deserialize_settings()
            .context("invalid file sink settings")?;
        let mut options = std::fs::OpenOptions::new();
        options.create(true);
        if config.truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options
            .open(&config.path)
            .with_context(|| format!("failed to open {}", config.path.display()))?;
        Ok(Self::new(
            setting,
            config.path.display().to_string(),
            Box::new(tokio::fs::File::from_std(file)),
        ))
    }
}

#[async_trait]
impl Sink for JsonLinesSink {
    async fn output(&self, records: &[Record]) -> anyhow::Result<()> {
        let mut payload = Vec::with_capacity(records.len() * 64);
        for record in records {
            serde_json::to_writer(&mut payload, record.data())?;
            payload.push(b'\n');
        }
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&payload)
            .await
            .with_context(|| format!("failed to write to {}", self.target))?;
        writer.flush().await?;
        tracing::trace!(
            pipeline = %self.pipeline,
            target = %self.target,
            records = records.len(),
            "Wrote batch"
        );
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.writer
            .lock()
            .await
            .flush()
            .await
            .with_context(|| format!("failed to flush {}", self.target))
    }
}
