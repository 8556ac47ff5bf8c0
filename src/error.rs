//! Top-level error types for the packaging pipeline binary.
//!
//! Stage failures are carried as [`crate::bundler::Error`]; this module adds
//! the CLI layer on top and maps both onto process exit codes and operator
//! hints.

use crate::bundler::ErrorKind;
use thiserror::Error;

/// Result type alias for CLI-level operations
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Main error type surfaced by the binary
#[derive(Error, Debug)]
pub enum BundlerError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pipeline stage errors
    #[error("{0}")]
    Pipeline(#[from] crate::bundler::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Unknown build target name
    #[error("Unknown target `{name}` (known targets: {known})")]
    UnknownTarget {
        /// Name given on the command line
        name: String,
        /// Comma separated list of valid names
        known: String,
    },
}

impl BundlerError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BundlerError::Cli(_) => 2,
            BundlerError::Pipeline(e) if e.kind() == ErrorKind::Input => 2,
            _ => 1,
        }
    }

    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        let BundlerError::Pipeline(e) = self else {
            return vec!["Check the error message above for specific details".to_string()];
        };

        if let crate::bundler::Error::RuntimeVersionMismatch { .. } = e.root_cause() {
            return vec![
                "Run `clean --runtime` to drop the cached runtime, then build again".to_string(),
            ];
        }

        match e.kind() {
            ErrorKind::Input => vec![
                "Check that every path in the pipeline file exists".to_string(),
                "Run `targets` to list the declared inputs of each target".to_string(),
            ],
            ErrorKind::ToolFailure => vec![
                "The tool output above is authoritative; fix the reported problem and rerun"
                    .to_string(),
            ],
            ErrorKind::Network => vec![
                "Check connectivity to the runtime URL; the download is not retried".to_string(),
            ],
            ErrorKind::StructuralViolation => vec![
                "Inspect the listed paths inside the .app bundle".to_string(),
                "Rebuild the bundle with `clean` followed by `build app`".to_string(),
            ],
            ErrorKind::Internal => {
                vec!["Check the error message above for specific details".to_string()]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::Error;

    #[test]
    fn exit_codes_follow_error_kind() {
        let cli = BundlerError::from(CliError::InvalidArguments {
            reason: "bad".into(),
        });
        assert_eq!(cli.exit_code(), 2);

        let config = BundlerError::from(Error::Config("no [macos] table".into()));
        assert_eq!(config.exit_code(), 2);

        let tool = BundlerError::from(Error::ToolFailure {
            tool: "pyinstaller".into(),
            status: Some(1),
            diagnostics: "ModuleNotFoundError".into(),
        });
        assert_eq!(tool.exit_code(), 1);
    }

    #[test]
    fn version_mismatch_suggests_runtime_clean() {
        let err = BundlerError::from(Error::Context(
            "target `runtime` failed".into(),
            Box::new(Error::RuntimeVersionMismatch {
                dir: "build/appdir".into(),
                expected: semver::Version::new(3, 9, 1),
                found: "3.8.0".into(),
            }),
        ));
        assert!(err.recovery_suggestions()[0].contains("clean --runtime"));
    }
}
