use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use streamprep_sdk::prelude::*;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use super::{default_write_timeout_ms, pump_lines, LineFormat};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSourceConfig {
    path: PathBuf,
    #[serde(default)]
    format: LineFormat,
    #[serde(default = "default_write_timeout_ms")]
    write_timeout_ms: u64,
}

/// Reads records from a file, one per line, then goes idle.
pub struct FileSource {
    pipeline: String,
    path: PathBuf,
    format: LineFormat,
    write_timeout: Duration,
    cancel: CancellationToken,
}

impl FileSource {
    /// # Errors
    ///
    /// Fails if `path` is missing or the settings are otherwise invalid.
    pub fn from_setting(setting: &PluginSetting) -> anyhow::Result<Self> {
        let config: FileSourceConfig = setting
            .deserialize_settings()
            .context("invalid file source settings")?;
        Ok(Self {
            pipeline: setting.pipeline_name().unwrap_or_default().to_string(),
            path: config.path,
            format: config.format,
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            cancel: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl Source for FileSource {
    /// Opens the file before returning, so a missing file fails the start.
    async fn start(&self, buffer: Arc<dyn Buffer>) -> anyhow::Result<()> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        tracing::info!(
            pipeline = %self.pipeline,
            path = %self.path.display(),
            "Reading records from file"
        );
        tokio::spawn(pump_lines(
            BufReader::new(file),
            buffer,
            self.format,
            self.write_timeout,
            self.cancel.clone(),
            self.pipeline.clone(),
        ));
        Ok(())
    }

    fn stop(&self) -> anyhow::Result<()> {
        self.cancel.cancel();
        Ok(())
    }
}
