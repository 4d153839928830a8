//! Whole-graph lifecycle: load a pipelines file, execute every pipeline, and
//! shut them all down.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::task::JoinSet;

use crate::builder::{GraphBuild, GraphBuilder};
use crate::config::parser::parse_pipelines;
use crate::config::types::PipelinesConfig;
use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::registry::PluginRegistry;

/// Parse `path` and build every pipeline it defines.
///
/// Pipelines whose bodies could not be deserialized are reported in
/// [`GraphBuild::failures`] alongside those that failed to build.
///
/// # Errors
///
/// Returns an error only when the file itself cannot be read or parsed.
pub fn load_pipelines(path: &Path, registry: &PluginRegistry) -> Result<GraphBuild> {
    let config = parse_pipelines(path)?;
    tracing::info!(
        path = %path.display(),
        pipelines = config.definitions.len() + config.rejected.len(),
        "Loaded pipelines file"
    );
    Ok(build_config(config, registry))
}

/// Build an already-parsed configuration document.
pub fn build_config(config: PipelinesConfig, registry: &PluginRegistry) -> GraphBuild {
    let mut build = GraphBuilder::new(registry).build_report(&config.definitions);
    for (name, reason) in config.rejected {
        let error = PipelineError::configuration(name.as_str(), reason);
        build.failures.insert(name, error);
    }
    build
}

/// Execute every pipeline concurrently. Returns the pipelines whose source
/// failed to start; the others keep running.
pub async fn execute_all(pipelines: &BTreeMap<String, Pipeline>) -> BTreeMap<String, PipelineError> {
    let mut set = JoinSet::new();
    for pipeline in pipelines.values() {
        let pipeline = pipeline.clone();
        set.spawn(async move { pipeline.execute().await });
    }

    let mut failures = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures.insert(e.pipeline().to_string(), e);
            }
            Err(e) => tracing::error!(error = %e, "Pipeline execution task failed"),
        }
    }

    tracing::info!(
        running = pipelines.len() - failures.len(),
        failed = failures.len(),
        "Pipelines executing"
    );
    failures
}

/// Shut every pipeline down concurrently, each with its own `timeout`.
pub async fn shutdown_all(pipelines: &BTreeMap<String, Pipeline>, timeout: Duration) {
    let start = Instant::now();
    let mut set = JoinSet::new();
    for pipeline in pipelines.values() {
        let pipeline = pipeline.clone();
        set.spawn(async move { pipeline.shutdown(timeout).await });
    }
    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Pipeline shutdown task failed");
        }
    }
    tracing::info!(
        pipelines = pipelines.len(),
        duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "All pipelines shut down"
    );
}
