use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamprep_types::PluginSetting;

pub const DEFAULT_WORKERS: u32 = 1;
pub const DEFAULT_READ_BATCH_DELAY_MS: u64 = 3_000;

/// Declarative description of one pipeline.
///
/// Required fields are optional here so that a missing source or an empty
/// sink list is reported by the validator for this pipeline alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDefinition {
    #[serde(default)]
    pub source: Option<PluginSetting>,
    #[serde(default)]
    pub buffer: Option<PluginSetting>,
    #[serde(default, alias = "prepper")]
    pub preppers: Vec<PluginSetting>,
    #[serde(default, alias = "sink")]
    pub sinks: Vec<PluginSetting>,
    #[serde(default)]
    pub workers: Option<u32>,
    /// Read-batch timeout in milliseconds.
    #[serde(default)]
    pub delay: Option<u64>,
}

impl PipelineDefinition {
    pub fn workers(&self) -> u32 {
        self.workers.unwrap_or(DEFAULT_WORKERS)
    }

    pub fn read_batch_delay(&self) -> Duration {
        Duration::from_millis(self.delay.unwrap_or(DEFAULT_READ_BATCH_DELAY_MS))
    }
}

/// A parsed configuration document.
#[derive(Debug, Clone, Default)]
pub struct PipelinesConfig {
    /// Pipelines whose bodies deserialized, keyed by name.
    pub definitions: BTreeMap<String, PipelineDefinition>,
    /// Pipelines whose bodies did not deserialize, with the reason.
    pub rejected: BTreeMap<String, String>,
}
