//! Error types shared by every pipeline stage.
//!
//! Each variant maps onto an [`ErrorKind`] so callers can decide what to do
//! with a failure (report it, ask for a clean, give up) without inspecting
//! exit codes or message text. Every kind currently carries
//! [`RetryPolicy::Never`].

use std::{
    fmt::Display,
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A declared input, tool or configuration value is missing or invalid.
    Input,
    /// An external tool ran and exited unsuccessfully.
    ToolFailure,
    /// The runtime download failed.
    Network,
    /// The application bundle has a layout the signer will reject.
    StructuralViolation,
    /// Anything else: local I/O, serialization, internal invariants.
    Internal,
}

/// What the pipeline may do after a failure of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Abort and surface the failure to the operator.
    Never,
}

/// Pipeline error.
#[derive(Debug, Error)]
pub enum Error {
    /// Free-form failure raised with [`bail!`](crate::bail).
    #[error("{0}")]
    GenericError(String),

    /// An error annotated with what the stage was doing.
    #[error("{0}: {1}")]
    Context(String, Box<Error>),

    /// Filesystem failure with the offending path.
    #[error("{action} `{}`: {source}", path.display())]
    Fs {
        /// What was being attempted
        action: String,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Bare IO error.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// A declared input does not exist or cannot be used.
    #[error("missing input `{}`: {reason}", path.display())]
    MissingInput {
        /// The input path
        path: PathBuf,
        /// Why it is unusable
        reason: String,
    },

    /// Invalid pipeline configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An external tool could not be located or spawned.
    #[error("tool `{tool}` is not available: {reason}")]
    ToolNotFound {
        /// Program name or path
        tool: String,
        /// Why it could not be started
        reason: String,
    },

    /// An external tool exited with a failure status.
    #[error("`{tool}` failed ({}){}", status_label(.status), diagnostics_suffix(.diagnostics))]
    ToolFailure {
        /// Program that failed
        tool: String,
        /// Exit code, `None` when killed by a signal
        status: Option<i32>,
        /// Captured stderr (falls back to stdout)
        diagnostics: String,
    },

    /// The runtime image could not be downloaded.
    #[error("download of {url} failed: {reason}")]
    NetworkFailure {
        /// Requested URL
        url: String,
        /// Transport or HTTP failure
        reason: String,
    },

    /// The cached runtime was extracted from a different pinned version.
    #[error(
        "runtime at `{}` is version {found}, but {expected} is pinned; run `clean --runtime` to re-fetch",
        dir.display()
    )]
    RuntimeVersionMismatch {
        /// Runtime directory
        dir: PathBuf,
        /// Pinned version
        expected: semver::Version,
        /// Version recorded in the cache marker
        found: String,
    },

    /// Bundle layout violations that the codesign fixup could not resolve.
    #[error(
        "unresolved code-signing layout violations in `{}`:\n  {}",
        bundle.display(),
        unresolved.join("\n  ")
    )]
    StructuralViolation {
        /// Application bundle root
        bundle: PathBuf,
        /// One line per unresolved path
        unresolved: Vec<String>,
    },

    /// JSON state or marker serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Pipeline file parse failure.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Bundle specification template failure.
    #[error("template error: {0}")]
    Template(#[from] handlebars::RenderError),

    /// Zip archive failure.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Invalid glob pattern in an input declaration.
    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// Directory traversal failure.
    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Path prefix mismatch while relativizing.
    #[error("path error: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// Mach-O parse failure.
    #[error("binary parse error: {0}")]
    Goblin(#[from] goblin::error::Error),

    /// Pinned runtime version does not parse.
    #[error("version error: {0}")]
    Semver(#[from] semver::Error),

    /// Runtime URL does not parse.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A blocking task panicked.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn status_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn diagnostics_suffix(diagnostics: &str) -> String {
    let trimmed = diagnostics.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{trimmed}")
    }
}

impl Error {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Context(_, inner) => inner.kind(),
            Error::MissingInput { .. }
            | Error::Config(_)
            | Error::ToolNotFound { .. }
            | Error::RuntimeVersionMismatch { .. }
            | Error::Toml(_)
            | Error::Glob(_)
            | Error::Semver(_)
            | Error::Url(_) => ErrorKind::Input,
            Error::ToolFailure { .. } => ErrorKind::ToolFailure,
            Error::NetworkFailure { .. } => ErrorKind::Network,
            Error::StructuralViolation { .. } => ErrorKind::StructuralViolation,
            _ => ErrorKind::Internal,
        }
    }

    /// Innermost error beneath any context annotations.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Context(_, inner) => inner.root_cause(),
            other => other,
        }
    }

    /// Retry policy declared for this error's kind.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.kind() {
            ErrorKind::Input
            | ErrorKind::ToolFailure
            | ErrorKind::Network
            | ErrorKind::StructuralViolation
            | ErrorKind::Internal => RetryPolicy::Never,
        }
    }
}

/// Adds a human readable context message to errors and empty options.
pub trait Context<T> {
    /// Wraps the error (or `None`) with `context`.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Like [`Context::context`], with the message built lazily.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Attaches the failing path to IO errors.
pub trait ErrorExt<T> {
    /// Converts an IO error into [`Error::Fs`] naming `action` and `path`.
    fn fs_context(self, action: &str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, io::Error> {
    fn fs_context(self, action: &str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| Error::Fs {
            action: action.to_string(),
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}

/// Returns early with an [`Error::GenericError`].
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::Error::GenericError(format!($msg)))
    };
    ($fmt:literal, $($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($fmt, $($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_preserves_inner_kind() {
        let err: Result<()> = Err(Error::NetworkFailure {
            url: "https://example.invalid/runtime.AppImage".into(),
            reason: "connection refused".into(),
        });
        let err = err.context("fetching base runtime").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.retry_policy(), RetryPolicy::Never);
        assert!(err.to_string().starts_with("fetching base runtime: "));
    }

    #[test]
    fn tool_failure_message_includes_diagnostics() {
        let err = Error::ToolFailure {
            tool: "pyinstaller".into(),
            status: Some(1),
            diagnostics: "ModuleNotFoundError: No module named 'foo'\n".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("`pyinstaller` failed (exit code 1)"));
        assert!(msg.contains("No module named 'foo'"));
        assert_eq!(err.kind(), ErrorKind::ToolFailure);
    }

    #[test]
    fn structural_violation_lists_every_path() {
        let err = Error::StructuralViolation {
            bundle: PathBuf::from("dist/App.app"),
            unresolved: vec!["a -> /outside".into(), "b: missing arm64".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("a -> /outside"));
        assert!(msg.contains("b: missing arm64"));
    }

    #[test]
    fn fs_context_names_path() {
        let io: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let err = io.fs_context("reading manifest", "resources.qrc").unwrap_err();
        assert!(err.to_string().contains("reading manifest `resources.qrc`"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
