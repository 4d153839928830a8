use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use streamprep_engine::orchestrator;

/// Execute the `run` command: build and execute every pipeline, then shut
/// them all down on Ctrl-C.
pub async fn execute(pipelines_path: &Path, shutdown_timeout_ms: u64) -> Result<()> {
    let registry = super::registry()?;
    let build = orchestrator::load_pipelines(pipelines_path, &registry)
        .with_context(|| format!("Failed to load pipelines: {}", pipelines_path.display()))?;

    for (name, error) in &build.failures {
        tracing::warn!(pipeline = %name, error = %error, "Pipeline skipped");
    }
    if build.pipelines.is_empty() {
        anyhow::bail!("No pipeline could be built from {}", pipelines_path.display());
    }

    let start_failures = orchestrator::execute_all(&build.pipelines).await;
    if start_failures.len() == build.pipelines.len() {
        orchestrator::shutdown_all(&build.pipelines, Duration::from_millis(shutdown_timeout_ms))
            .await;
        anyhow::bail!("No pipeline could be started");
    }

    tracing::info!(
        running = build.pipelines.len() - start_failures.len(),
        "Pipelines running, press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutdown signal received");
    orchestrator::shutdown_all(&build.pipelines, Duration::from_millis(shutdown_timeout_ms)).await;
    Ok(())
}
