//! Explicit plugin registration table.
//!
//! Each role maps a type-name to a factory that builds a trait object from a
//! [`PluginSetting`]. Tables are populated once at process start; nothing is
//! discovered at runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use streamprep_sdk::{Buffer, Prepper, Sink, Source};
use streamprep_types::PluginSetting;

use crate::buffer::{BlockingBuffer, BLOCKING_BUFFER_TYPE};
use crate::connector::PIPELINE_TYPE;

pub type SourceFactory = Box<dyn Fn(&PluginSetting) -> Result<Arc<dyn Source>> + Send + Sync>;
pub type BufferFactory = Box<dyn Fn(&PluginSetting) -> Result<Arc<dyn Buffer>> + Send + Sync>;
pub type PrepperFactory = Box<dyn Fn(&PluginSetting) -> Result<Arc<dyn Prepper>> + Send + Sync>;
pub type SinkFactory = Box<dyn Fn(&PluginSetting) -> Result<Arc<dyn Sink>> + Send + Sync>;

/// Component role a plugin is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PluginRole {
    Source,
    Buffer,
    Prepper,
    Sink,
}

impl std::fmt::Display for PluginRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Source => "source",
            Self::Buffer => "buffer",
            Self::Prepper => "prepper",
            Self::Sink => "sink",
        };
        f.write_str(s)
    }
}

pub struct PluginRegistry {
    sources: BTreeMap<String, SourceFactory>,
    buffers: BTreeMap<String, BufferFactory>,
    preppers: BTreeMap<String, PrepperFactory>,
    sinks: BTreeMap<String, SinkFactory>,
}

impl PluginRegistry {
    /// A registry holding only the default `bounded_blocking` buffer.
    pub fn new() -> Self {
        let mut buffers: BTreeMap<String, BufferFactory> = BTreeMap::new();
        buffers.insert(
            BLOCKING_BUFFER_TYPE.to_string(),
            Box::new(|setting: &PluginSetting| {
                Ok(Arc::new(BlockingBuffer::from_setting(setting)?) as Arc<dyn Buffer>)
            }),
        );
        Self {
            sources: BTreeMap::new(),
            buffers,
            preppers: BTreeMap::new(),
            sinks: BTreeMap::new(),
        }
    }

    /// # Errors
    ///
    /// Fails if `name` is reserved or already registered as a source.
    pub fn register_source<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&PluginSetting) -> Result<Arc<dyn Source>> + Send + Sync + 'static,
    {
        insert(&mut self.sources, PluginRole::Source, name, Box::new(factory))
    }

    /// # Errors
    ///
    /// Fails if `name` is reserved or already registered as a buffer.
    pub fn register_buffer<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&PluginSetting) -> Result<Arc<dyn Buffer>> + Send + Sync + 'static,
    {
        insert(&mut self.buffers, PluginRole::Buffer, name, Box::new(factory))
    }

    /// # Errors
    ///
    /// Fails if `name` is reserved or already registered as a prepper.
    pub fn register_prepper<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&PluginSetting) -> Result<Arc<dyn Prepper>> + Send + Sync + 'static,
    {
        insert(&mut self.preppers, PluginRole::Prepper, name, Box::new(factory))
    }

    /// # Errors
    ///
    /// Fails if `name` is reserved or already registered as a sink.
    pub fn register_sink<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&PluginSetting) -> Result<Arc<dyn Sink>> + Send + Sync + 'static,
    {
        insert(&mut self.sinks, PluginRole::Sink, name, Box::new(factory))
    }

    /// # Errors
    ///
    /// Fails if no source is registered under the setting's name, or the
    /// factory itself fails.
    pub fn new_source(&self, setting: &PluginSetting) -> Result<Arc<dyn Source>> {
        lookup(&self.sources, PluginRole::Source, setting)?(setting)
    }

    /// # Errors
    ///
    /// Fails if the buffer type is unknown or its factory fails.
    pub fn new_buffer(&self, setting: &PluginSetting) -> Result<Arc<dyn Buffer>> {
        lookup(&self.buffers, PluginRole::Buffer, setting)?(setting)
    }

    /// # Errors
    ///
    /// Fails if the prepper type is unknown or its factory fails.
    pub fn new_prepper(&self, setting: &PluginSetting) -> Result<Arc<dyn Prepper>> {
        lookup(&self.preppers, PluginRole::Prepper, setting)?(setting)
    }

    /// # Errors
    ///
    /// Fails if the sink type is unknown or its factory fails.
    pub fn new_sink(&self, setting: &PluginSetting) -> Result<Arc<dyn Sink>> {
        lookup(&self.sinks, PluginRole::Sink, setting)?(setting)
    }

    /// Registered type-names per role, sorted.
    pub fn plugin_names(&self) -> Vec<(PluginRole, Vec<String>)> {
        vec![
            (PluginRole::Source, self.sources.keys().cloned().collect()),
            (PluginRole::Buffer, self.buffers.keys().cloned().collect()),
            (PluginRole::Prepper, self.preppers.keys().cloned().collect()),
            (PluginRole::Sink, self.sinks.keys().cloned().collect()),
        ]
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn insert<T>(
    table: &mut BTreeMap<String, T>,
    role: PluginRole,
    name: &str,
    factory: T,
) -> Result<()> {
    if name == PIPELINE_TYPE {
        bail!("'{PIPELINE_TYPE}' is reserved for inter-pipeline connectors");
    }
    if name.trim().is_empty() {
        bail!("{role} plugin name must not be empty");
    }
    if table.contains_key(name) {
        bail!("{role} plugin '{name}' is already registered");
    }
    table.insert(name.to_string(), factory);
    Ok(())
}

fn lookup<'a, T>(
    table: &'a BTreeMap<String, T>,
    role: PluginRole,
    setting: &PluginSetting,
) -> Result<&'a T> {
    table
        .get(setting.name())
        .ok_or_else(|| anyhow!("no {role} plugin registered as '{}'", setting.name()))
}
