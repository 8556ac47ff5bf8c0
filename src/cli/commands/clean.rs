//! `clean [--runtime]`.

use crate::{
    bundler::{Pipeline, Settings},
    cli::RuntimeConfig,
    error::Result,
};

/// Removes generated artifacts, and the runtime with `runtime`.
pub async fn clean(settings: Settings, runtime: bool, config: &RuntimeConfig) -> Result<()> {
    let pipeline = Pipeline::new(settings);
    let removed = pipeline.clean(runtime).await?;

    for path in &removed {
        config.verbose_println(&format!("  removed {}", path.display()))?;
    }
    if removed.is_empty() {
        config.success("Nothing to clean")?;
    } else {
        config.success(&format!("Removed {} path(s)", removed.len()))?;
    }
    if !runtime {
        config.verbose_println("Runtime kept; pass --runtime to re-fetch it")?;
    }
    Ok(())
}
