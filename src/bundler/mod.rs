//! Multi-target packaging pipeline.
//!
//! Compiles embedded resources and produces a source distribution, a macOS
//! application bundle (fixed up, signed and zipped) and a Linux AppImage.
//! Targets form a dependency graph evaluated leaf to root; a target runs only
//! when its output is stale.
//!
//! # Module Organization
//!
//! - [`builder`] - [`Pipeline`] orchestration and artifact reporting
//! - [`error`] - error kinds shared by every stage
//! - [`graph`] - target graph and staleness policies
//! - [`platform`] - the stages themselves
//! - [`settings`] - pipeline file and [`Settings`]
//! - [`utils`] - file system, process and download helpers

pub mod builder;
pub mod error;
pub mod graph;
pub mod platform;
pub mod settings;
pub mod utils;

pub use builder::{BuildSummary, BuiltArtifact, Pipeline};
pub use error::{Error, ErrorKind, Result, RetryPolicy};
pub use graph::StalenessPolicy;
pub use platform::TargetId;
pub use settings::{Settings, SettingsBuilder};
