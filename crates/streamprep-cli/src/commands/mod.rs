pub mod check;
pub mod plugins;
pub mod run;

use anyhow::Result;
use streamprep_engine::PluginRegistry;

/// Registry holding the engine's own plugins plus every built-in.
pub fn registry() -> Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    streamprep_plugins::register_builtins(&mut registry)?;
    Ok(registry)
}
