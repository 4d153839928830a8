//! Semantic validation for pipeline definitions.
//!
//! Every check reports against a single pipeline; a failure there never
//! invalidates its neighbours.

use std::collections::BTreeMap;

use streamprep_types::PluginSetting;

use crate::config::types::PipelineDefinition;
use crate::connector::{PIPELINE_NAME_ATTRIBUTE, PIPELINE_TYPE};
use crate::error::PipelineError;

/// Target of a `pipeline`-typed setting, if it is one and names a pipeline.
pub fn pipeline_reference(setting: &PluginSetting) -> Option<&str> {
    if setting.name() == PIPELINE_TYPE {
        setting.string_attribute(PIPELINE_NAME_ATTRIBUTE)
    } else {
        None
    }
}

pub fn is_pipeline_type(setting: &PluginSetting) -> bool {
    setting.name() == PIPELINE_TYPE
}

/// Validate one definition in isolation.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] listing every problem found.
pub fn validate_definition(name: &str, definition: &PipelineDefinition) -> Result<(), PipelineError> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push("pipeline name must not be empty".to_string());
    }

    match &definition.source {
        None => errors.push("source is a required component".to_string()),
        Some(source) if is_pipeline_type(source) && pipeline_reference(source) == Some(name) => {
            errors.push("source cannot reference its own pipeline".to_string());
        }
        Some(_) => {}
    }

    if definition.sinks.is_empty() {
        errors.push("at least one sink is required".to_string());
    }
    for (i, sink) in definition.sinks.iter().enumerate() {
        if !is_pipeline_type(sink) {
            continue;
        }
        match pipeline_reference(sink) {
            None => errors.push(format!(
                "sinks[{i}]: '{PIPELINE_TYPE}' sink requires a '{PIPELINE_NAME_ATTRIBUTE}' setting"
            )),
            Some(target) if target == name => {
                errors.push(format!("sinks[{i}]: sink cannot reference its own pipeline"));
            }
            Some(_) => {}
        }
    }

    if definition.buffer.as_ref().is_some_and(is_pipeline_type) {
        errors.push(format!("buffer: '{PIPELINE_TYPE}' is only valid as a source or sink"));
    }
    for (i, prepper) in definition.preppers.iter().enumerate() {
        if is_pipeline_type(prepper) {
            errors.push(format!(
                "preppers[{i}]: '{PIPELINE_TYPE}' is only valid as a source or sink"
            ));
        }
    }

    if definition.workers == Some(0) {
        errors.push("workers cannot be 0".to_string());
    }
    if definition.delay == Some(0) {
        errors.push("delay must be greater than 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::configuration(name, errors.join("; ")))
    }
}

/// Check that every inter-pipeline edge touching `name` has a matching end
/// in `definitions`.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] listing every dangling edge.
pub fn validate_edges(
    name: &str,
    definition: &PipelineDefinition,
    definitions: &BTreeMap<String, PipelineDefinition>,
) -> Result<(), PipelineError> {
    let mut errors = Vec::new();

    for target in definition.sinks.iter().filter_map(pipeline_reference) {
        let Some(downstream) = definitions.get(target) else {
            errors.push(format!("sink references unknown pipeline [{target}]"));
            continue;
        };
        match downstream.source.as_ref() {
            Some(source) if is_pipeline_type(source) => {
                if let Some(upstream) = pipeline_reference(source) {
                    if upstream != name {
                        errors.push(format!(
                            "sink targets pipeline [{target}] whose source names [{upstream}]"
                        ));
                    }
                }
            }
            _ => errors.push(format!(
                "sink targets pipeline [{target}] whose source is not of type '{PIPELINE_TYPE}'"
            )),
        }
    }

    if let Some(source) = definition.source.as_ref().filter(|s| is_pipeline_type(s)) {
        match pipeline_reference(source) {
            Some(upstream) => match definitions.get(upstream) {
                None => errors.push(format!("source references unknown pipeline [{upstream}]")),
                Some(up) if !targets(up, name) => errors.push(format!(
                    "source names pipeline [{upstream}] which has no '{PIPELINE_TYPE}' sink for [{name}]"
                )),
                Some(_) => {}
            },
            None => {
                if !definitions.iter().any(|(n, d)| n != name && targets(d, name)) {
                    errors.push(format!("no pipeline has a '{PIPELINE_TYPE}' sink for [{name}]"));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::configuration(name, errors.join("; ")))
    }
}

fn targets(definition: &PipelineDefinition, target: &str) -> bool {
    definition
        .sinks
        .iter()
        .any(|sink| pipeline_reference(sink) == Some(target))
}
