//! External tool detection and availability checking.
//!
//! Reports which configured programs each target will invoke and whether
//! they can be found. Detection is advisory: the stage itself fails with
//! `ToolNotFound` if a program is really missing.

use crate::bundler::{Settings, platform::TargetId};
use std::path::{Path, PathBuf};

/// A program a target invokes, and where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    /// Program as configured
    pub tool: String,
    /// Resolved location, `None` when not found
    pub path: Option<PathBuf>,
}

/// Programs invoked by `target`, as configured.
///
/// The runtime image and its interpreter are produced by the pipeline and
/// are not listed.
pub fn required_tools(settings: &Settings, target: TargetId) -> Vec<String> {
    let first = |argv: &[String]| argv.first().cloned();
    match target {
        TargetId::Resources => first(&settings.resources().compiler).into_iter().collect(),
        TargetId::Sdist => first(&settings.sdist().command).into_iter().collect(),
        TargetId::AppBundle => settings
            .macos()
            .map(|macos| {
                let mut tools: Vec<String> = first(&macos.bundler).into_iter().collect();
                if macos.signing.enabled {
                    tools.extend(first(&macos.signing.command));
                }
                tools
            })
            .unwrap_or_default(),
        TargetId::AppArchive | TargetId::Runtime => Vec::new(),
        TargetId::AppImage => vec![settings.appimagetool()],
    }
}

/// Resolves `tool` the way stages do: paths relative to `root`, bare names
/// on `PATH`.
pub fn locate(tool: &str, root: &Path) -> Option<PathBuf> {
    let path = Path::new(tool);
    if path.components().count() > 1 || path.is_absolute() {
        let candidate = root.join(path);
        return candidate.is_file().then_some(candidate);
    }
    match which::which(tool) {
        Ok(found) => {
            log::debug!("Found {} at: {}", tool, found.display());
            Some(found)
        }
        Err(e) => {
            log::debug!("{} not found in PATH: {}", tool, e);
            None
        }
    }
}

/// Availability of every program `target` invokes.
pub fn detect(settings: &Settings, target: TargetId) -> Vec<ToolStatus> {
    required_tools(settings, target)
        .into_iter()
        .map(|tool| {
            let path = locate(&tool, settings.root());
            ToolStatus { tool, path }
        })
        .collect()
}

/// Programs `target` invokes that cannot be found.
pub fn missing_tools(settings: &Settings, target: TargetId) -> Vec<String> {
    detect(settings, target)
        .into_iter()
        .filter(|status| status.path.is_none())
        .map(|status| status.tool)
        .collect()
}
