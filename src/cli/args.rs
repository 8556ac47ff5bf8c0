//! Command line argument parsing and validation.
//!
//! This module provides CLI argument parsing using clap, with target name
//! validation and the runtime configuration derived from the flags.

use crate::{
    bundler::{StalenessPolicy, TargetId, settings::DEFAULT_CONFIG_FILE},
    error::CliError,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Packaging pipeline for desktop applications
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_pipeline",
    version,
    about = "Packaging pipeline for desktop applications",
    long_about = "Builds a source distribution, a signed macOS .app (and its zip) and a Linux AppImage
from the targets declared in packaging.toml. Targets whose outputs are up to date are skipped.

Usage:
  kodegen_bundler_pipeline build
  kodegen_bundler_pipeline build app-zip --dry-run
  kodegen_bundler_pipeline --staleness content-hash build appimage
  kodegen_bundler_pipeline clean --runtime

Exit code 0 = every requested artifact exists and is up to date."
)]
pub struct Args {
    /// Pipeline file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Staleness policy (overrides `[pipeline].staleness`)
    #[arg(long, value_enum, value_name = "POLICY", global = true)]
    pub staleness: Option<StalenessPolicy>,

    /// AppImage builder program
    ///
    /// Default: `appimagetool-<machine>.AppImage` from PATH.
    #[arg(long, env = "APPIMAGETOOL", value_name = "PROGRAM", global = true)]
    pub appimagetool: Option<String>,

    /// Show tool output and staleness decisions
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors and artifact paths
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline operations.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Bring targets up to date (all configured targets when none are named)
    Build {
        /// Targets to build: resources, sdist, app, app-zip, runtime, appimage
        #[arg(value_name = "TARGET")]
        targets: Vec<String>,

        /// Print what would run and why, without running anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List configured targets, their outputs and required tools
    Targets,

    /// Remove generated artifacts and build state
    Clean {
        /// Also remove the extracted base runtime and its cached image
        #[arg(long)]
        runtime: bool,
    },
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), CliError> {
        if self.config.as_os_str().is_empty() {
            return Err(CliError::InvalidArguments {
                reason: "--config cannot be empty".to_string(),
            });
        }
        if let Some(tool) = &self.appimagetool {
            if tool.trim().is_empty() {
                return Err(CliError::InvalidArguments {
                    reason: "APPIMAGETOOL is set but empty".to_string(),
                });
            }
        }
        self.requested_targets().map(|_| ())
    }

    /// Targets named on the `build` command line, in the order given.
    pub fn requested_targets(&self) -> Result<Vec<TargetId>, CliError> {
        let Command::Build { targets, .. } = &self.command else {
            return Ok(Vec::new());
        };
        targets
            .iter()
            .map(|name| {
                name.parse::<TargetId>()
                    .map_err(|_| CliError::UnknownTarget {
                        name: name.clone(),
                        known: TargetId::ALL.map(|t| t.name()).join(", "),
                    })
            })
            .collect()
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for terminal output
    output: super::OutputManager,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        let output = super::OutputManager::new(args.verbose, args.quiet);
        Self { output }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print verbose message if in verbose mode
    pub fn verbose_println(&self, message: &str) -> std::io::Result<()> {
        self.output.verbose(message)
    }

    /// Print success message if not in quiet mode
    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.output.success(message)
    }

    /// Print warning message if not in quiet mode
    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.output.warn(message)
    }

    /// Print progress message
    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        self.output.progress(message)
    }

    /// Print section header
    pub fn section(&self, title: &str) -> std::io::Result<()> {
        self.output.section(title)
    }

    /// Print indented text
    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        self.output.indent(message)
    }

    /// Print a line that survives `--quiet`
    pub fn result(&self, message: &str) -> std::io::Result<()> {
        self.output.result(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_targets_and_global_flags() {
        let args = Args::try_parse_from([
            "kodegen_bundler_pipeline",
            "build",
            "app-zip",
            "--dry-run",
            "--staleness",
            "content-hash",
        ])
        .unwrap();
        assert_eq!(args.staleness, Some(StalenessPolicy::ContentHash));
        assert_eq!(args.config, PathBuf::from("packaging.toml"));
        assert_eq!(args.requested_targets().unwrap(), vec![TargetId::AppArchive]);
        assert!(matches!(args.command, Command::Build { dry_run: true, .. }));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let args = Args::try_parse_from(["kodegen_bundler_pipeline", "build", "dmg"]).unwrap();
        assert!(matches!(
            args.validate(),
            Err(CliError::UnknownTarget { name, .. }) if name == "dmg"
        ));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Args::try_parse_from(["kodegen_bundler_pipeline", "-v", "-q", "targets"]).is_err());
    }
}
