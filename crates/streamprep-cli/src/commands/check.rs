use std::path::Path;

use anyhow::{Context, Result};
use streamprep_engine::orchestrator;

/// Execute the `check` command: build every pipeline and report its status.
pub fn execute(pipelines_path: &Path) -> Result<()> {
    let registry = super::registry()?;
    let build = orchestrator::load_pipelines(pipelines_path, &registry)
        .with_context(|| format!("Failed to load pipelines: {}", pipelines_path.display()))?;

    for (name, pipeline) in &build.pipelines {
        println!(
            "{:24} OK ({} worker(s), {} prepper(s), {} sink(s))",
            format!("{name}:"),
            pipeline.workers(),
            pipeline.preppers().len(),
            pipeline.sinks().len()
        );
    }
    for (name, error) in &build.failures {
        println!("{:24} FAILED", format!("{name}:"));
        println!("  {error}");
    }

    if build.is_complete() {
        println!("\nAll {} pipeline(s) built.", build.pipelines.len());
        Ok(())
    } else {
        anyhow::bail!(
            "{} of {} pipeline(s) failed to build",
            build.failures.len(),
            build.pipelines.len() + build.failures.len()
        )
    }
}
