//! `build` and `build --dry-run`.

use super::format_size;
use crate::{
    bundler::{
        Pipeline, Settings, TargetId,
        graph::{Freshness, Outcome},
    },
    cli::RuntimeConfig,
    error::Result,
};

/// Brings the requested targets up to date and reports the artifacts.
pub async fn build(
    settings: Settings,
    requested: &[TargetId],
    config: &RuntimeConfig,
) -> Result<()> {
    let mut pipeline = Pipeline::new(settings);
    config.section(&format!(
        "Packaging {}",
        pipeline.settings().product_name()
    ))?;

    let summary = pipeline.build(requested).await?;

    for (target, outcome) in summary.report.outcomes() {
        match outcome {
            Outcome::Built(reason) => config.progress(&format!("{target}: built ({reason})"))?,
            Outcome::UpToDate => config.verbose_println(&format!("  {target}: up to date"))?,
        }
    }

    let built = summary.report.built().len();
    let skipped = summary.report.skipped().len();
    config.success(&format!("{built} target(s) built, {skipped} up to date"))?;

    if !summary.artifacts.is_empty() {
        config.section("Artifacts")?;
    }
    for artifact in &summary.artifacts {
        config.result(&format!(
            "{}  {}  {}{}",
            artifact.path.display(),
            format_size(artifact.size),
            artifact.checksum,
            if artifact.rebuilt { "" } else { "  (unchanged)" }
        ))?;
    }
    Ok(())
}

/// Prints which targets would run and why.
pub async fn plan(
    settings: Settings,
    requested: &[TargetId],
    config: &RuntimeConfig,
) -> Result<()> {
    let pipeline = Pipeline::new(settings);
    config.section("Dry run")?;

    let plan = pipeline.plan(requested).await?;
    let mut stale = 0;
    for (target, freshness) in &plan {
        match freshness {
            Freshness::Stale(reason) => {
                stale += 1;
                config.result(&format!("would build {target}: {reason}"))?;
            }
            Freshness::UpToDate => config.result(&format!("up to date  {target}"))?,
        }
    }
    config.success(&format!("{stale} of {} target(s) would run", plan.len()))?;
    Ok(())
}
