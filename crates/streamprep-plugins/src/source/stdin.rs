use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use streamprep_sdk::prelude::*;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use super::{default_write_timeout_ms, pump_lines, LineFormat};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct StdinConfig {
    #[serde(default)]
    format: LineFormat,
    #[serde(default = "default_write_timeout_ms")]
    write_timeout_ms: u64,
}

/// Reads records from standard input, one per line.
pub struct StdinSource {
    pipeline: String,
    format: LineFormat,
    write_timeout: Duration,
    cancel: CancellationToken,
}

impl StdinSource {
    /// # Errors
    ///
    /// Fails if the settings do not match the source's configuration.
    pub fn from_setting(setting: &PluginSetting) -> anyhow::Result<Self> {
        let config: StdinConfig = setting
            .deserialize_settings()
            .context("invalid stdin source settings")?;
        Ok(Self {
            pipeline: setting.pipeline_name().unwrap_or_default().to_string(),
            format: config.format,
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            cancel: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl Source for StdinSource {
    async fn start(&self, buffer: std::sync::Arc<dyn Buffer>) -> anyhow::Result<()> {
        tracing::info!(pipeline = %self.pipeline, "Reading records from stdin");
        tokio::spawn(pump_lines(
            BufReader::new(tokio::io::stdin()),
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_setting_defaults() {
        let setting = PluginSetting::from_value(json!("stdin"))
            .unwrap()
            .with_pipeline_name("ingest");
        let source = StdinSource::from_setting(&setting).unwrap();
        assert_eq!(source.pipeline, "ingest");
        assert_eq!(source.format, LineFormat::Plain);
        assert_eq!(source.write_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_from_setting_rejects_unknown_key() {
        let setting = PluginSetting::from_value(json!({"stdin": {"encoding": "latin1"}})).unwrap();
        assert!(StdinSource::from_setting(&setting).is_err());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let source =
            StdinSource::from_setting(&PluginSetting::from_value(json!("stdin")).unwrap()).unwrap();
        source.stop().unwrap();
        source.stop().unwrap();
        assert!(source.cancel.is_cancelled());
    }
}
