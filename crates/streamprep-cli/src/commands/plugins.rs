use anyhow::Result;

/// Execute the `plugins` command: list registered type-names per role.
pub fn execute() -> Result<()> {
    let registry = super::registry()?;
    for (role, names) in registry.plugin_names() {
        println!("{:10} {}", format!("{role}:"), names.join(", "));
    }
    println!("{:10} {}", "connector:", streamprep_engine::connector::PIPELINE_TYPE);
    Ok(())
}
