//! Pipeline orchestration and coordination.
//!
//! This module provides the main [`Pipeline`] orchestrator that builds the
//! target graph from [`Settings`](crate::bundler::Settings) and runs the
//! platform stages in dependency order.
//!
//! # Overview
//!
//! The pipeline:
//! 1. Declares every configured target with its inputs and output
//! 2. Selects the requested targets and their ancestors
//! 3. Skips targets whose outputs are up to date
//! 4. Delegates stale targets to platform-specific stages
//! 5. Returns [`BuiltArtifact`] results with size and SHA-256
//!
//! # Module Organization
//!
//! - [`checksum`] - SHA256 checksum calculation for artifacts and inputs
//! - [`orchestrator`] - Main [`Pipeline`] struct and build operations
//! - [`tool_detection`] - External tool availability checking

pub(crate) mod checksum;
mod orchestrator;
pub mod tool_detection;

pub use orchestrator::{BuildSummary, BuiltArtifact, Pipeline};
