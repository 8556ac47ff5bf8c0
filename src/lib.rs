//! Multi-target desktop packaging pipeline
//!
//! This library drives the packaging of a desktop application into:
//! - a source distribution with a canonical file name
//! - a macOS `.app` bundle, repaired for code signing, signed and zipped
//! - a Linux AppImage built on a pinned base runtime
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundler;
pub mod cli;
pub mod error;

// Re-export commonly used types
pub use error::{BundlerError, CliError, Result};
