//! Command line interface for the packaging pipeline.
//!
//! This module provides the CLI for pipeline operations, with argument
//! parsing, command execution, and user feedback.

mod args;
pub mod commands;
mod output;

pub use args::{Args, Command, RuntimeConfig};
pub use output::OutputManager;

use crate::{bundler::SettingsBuilder, error::Result};

/// Main CLI entry point
pub async fn run(args: Args, config: &RuntimeConfig) -> Result<()> {
    args.validate()?;
    let requested = args.requested_targets()?;

    let mut builder = SettingsBuilder::new().config_path(&args.config);
    if let Some(policy) = args.staleness {
        builder = builder.staleness(policy);
    }
    if let Some(tool) = &args.appimagetool {
        builder = builder.appimagetool(tool.clone());
    }
    let settings = builder.build()?;
    config.verbose_println(&format!(
        "Using {} (staleness: {:?})",
        settings.config_file().display(),
        settings.staleness()
    ))?;

    match args.command {
        Command::Build { dry_run: true, .. } => commands::plan(settings, &requested, config).await,
        Command::Build { .. } => commands::build(settings, &requested, config).await,
        Command::Targets => commands::targets(settings, config).await,
        Command::Clean { runtime } => commands::clean(settings, runtime, config).await,
    }
}
