//! `targets`: configured targets, outputs, dependencies and tools.

use crate::{
    bundler::{Pipeline, Settings, builder::tool_detection},
    cli::RuntimeConfig,
    error::Result,
};

/// Lists the configured targets in build order.
pub async fn targets(settings: Settings, config: &RuntimeConfig) -> Result<()> {
    let pipeline = Pipeline::new(settings);
    let graph = pipeline.graph()?;

    config.section("Targets")?;
    for key in graph.execution_order(&[])? {
        let Some(target) = graph.target(key) else {
            continue;
        };
        config.result(&format!("{:<10} {}", key.name(), key.description()))?;
        config.indent(&format!("output: {}", target.output().display()))?;

        let deps = graph.dependencies(key);
        if !deps.is_empty() {
            let names: Vec<&str> = deps.iter().map(|d| d.name()).collect();
            config.indent(&format!("after:  {}", names.join(", ")))?;
        }

        for status in tool_detection::detect(pipeline.settings(), key) {
            match &status.path {
                Some(path) => config.indent(&format!("tool:   {} ({})", status.tool, path.display()))?,
                None => config.warn(&format!("{}: `{}` not found", key, status.tool))?,
            }
        }
    }
    Ok(())
}
