//! Built-in leaf plugins.
//!
//! | role    | type-names                   |
//! |---------|------------------------------|
//! | source  | `stdin`, `file`              |
//! | prepper | `string_converter`, `no-op`  |
//! | sink    | `stdout`, `file`             |

pub mod prepper;
pub mod sink;
pub mod source;

use std::sync::Arc;

use anyhow::Result;
use streamprep_engine::PluginRegistry;
use streamprep_sdk::prelude::*;

/// Register every built-in plugin with `registry`.
///
/// # Errors
///
/// Fails if any built-in name is already registered.
pub fn register_builtins(registry: &mut PluginRegistry) -> Result<()> {
    registry.register_source(source::STDIN, |setting: &PluginSetting| {
        Ok(Arc::new(source::StdinSource::from_setting(setting)?) as Arc<dyn Source>)
    })?;
    registry.register_source(source::FILE, |setting: &PluginSetting| {
        Ok(Arc::new(source::FileSource::from_setting(setting)?) as Arc<dyn Source>)
    })?;

    registry.register_prepper(prepper::STRING_CONVERTER, |setting: &PluginSetting| {
        Ok(Arc::new(prepper::StringConverter::from_setting(setting)?) as Arc<dyn Prepper>)
    })?;
    registry.register_prepper(prepper::NO_OP, |_: &PluginSetting| {
        Ok(Arc::new(prepper::NoOp) as Arc<dyn Prepper>)
    })?;

    registry.register_sink(sink::STDOUT, |setting: &PluginSetting| {
        Ok(Arc::new(sink::JsonLinesSink::stdout(setting)) as Arc<dyn Sink>)
    })?;
    registry.register_sink(sink::FILE, |setting: &PluginSetting| {
        Ok(Arc::new(sink::JsonLinesSink::file(setting)?) as Arc<dyn Sink>)
    })?;
    Ok(())
}
