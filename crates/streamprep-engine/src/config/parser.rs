//! Pipeline YAML parsing with environment variable substitution.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::{PipelineDefinition, PipelinesConfig};

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = BTreeSet::new();
    let result = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_else(|_| {
            missing.insert(cap[1].to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        let names: Vec<String> = missing.into_iter().collect();
        anyhow::bail!("Missing environment variable(s): {}", names.join(", "));
    }

    Ok(result.into_owned())
}

/// Parse a pipelines YAML document (after env var substitution).
///
/// The top level must be a mapping of pipeline name to definition, and a
/// name may appear only once. Each definition is deserialized on its own: a
/// malformed body lands in [`PipelinesConfig::rejected`] instead of failing
/// the whole document.
///
/// # Errors
///
/// Returns an error if substitution fails, the top level is not a mapping,
/// a pipeline name is repeated, or a name is not a string.
pub fn parse_pipelines_str(yaml_str: &str) -> Result<PipelinesConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    // Value (not a typed map) so repeated keys are an error instead of last-wins.
    let document: serde_yaml::Value =
        serde_yaml::from_str(&substituted).context("Failed to parse pipelines YAML")?;

    let raw = match document {
        serde_yaml::Value::Mapping(mapping) => mapping,
        serde_yaml::Value::Null => serde_yaml::Mapping::new(),
        other => anyhow::bail!(
            "Pipelines YAML must be a mapping of pipeline name to definition, found {}",
            yaml_kind(&other)
        ),
    };

    let mut config = PipelinesConfig::default();
    for (key, body) in raw {
        let serde_yaml::Value::String(name) = key else {
            anyhow::bail!("Pipeline names must be strings, found {}", yaml_kind(&key));
        };
        match serde_yaml::from_value::<PipelineDefinition>(body) {
            Ok(definition) => {
                config.definitions.insert(name, definition);
            }
            Err(e) => {
                tracing::error!(pipeline = %name, error = %e, "Invalid pipeline definition");
                config.rejected.insert(name, e.to_string());
            }
        }
    }
    Ok(config)
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

/// Parse a pipelines YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_pipelines(path: &Path) -> Result<PipelinesConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipelines file: {}", path.display()))?;
    parse_pipelines_str(&content)
}
