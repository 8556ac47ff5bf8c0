//! Pipeline stages and the targets they produce.
//!
//! - [`resources`] - resource module generation
//! - [`sdist`] - source distribution
//! - [`macos`] - `.app` assembly, codesign fixup, signature and archive
//! - [`linux`] - base runtime fetch and AppImage assembly

pub mod linux;
pub mod macos;
pub mod resources;
pub mod sdist;

use std::{fmt, str::FromStr};

/// Build targets of the pipeline.
///
/// Each target names the stage that produces its output.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum TargetId {
    /// Generated resource module.
    Resources,
    /// Canonically named source archive.
    Sdist,
    /// Assembled, fixed-up and signed `.app` bundle.
    AppBundle,
    /// Zip archive of the `.app` bundle.
    AppArchive,
    /// Extracted base runtime (its version marker is the output).
    Runtime,
    /// Portable Linux executable.
    AppImage,
}

impl TargetId {
    /// Every target, leaf first.
    pub const ALL: [TargetId; 6] = [
        TargetId::Resources,
        TargetId::Sdist,
        TargetId::AppBundle,
        TargetId::AppArchive,
        TargetId::Runtime,
        TargetId::AppImage,
    ];

    /// Command line name.
    pub fn name(&self) -> &'static str {
        match self {
            TargetId::Resources => "resources",
            TargetId::Sdist => "sdist",
            TargetId::AppBundle => "app",
            TargetId::AppArchive => "app-zip",
            TargetId::Runtime => "runtime",
            TargetId::AppImage => "appimage",
        }
    }

    /// Whether the output is a distributable artifact under the dist dir.
    pub fn is_artifact(&self) -> bool {
        matches!(
            self,
            TargetId::Sdist | TargetId::AppBundle | TargetId::AppArchive | TargetId::AppImage
        )
    }

    /// One-line description for `targets`.
    pub fn description(&self) -> &'static str {
        match self {
            TargetId::Resources => "compile the resource manifest into a module",
            TargetId::Sdist => "build the source distribution",
            TargetId::AppBundle => "assemble, fix up and sign the macOS .app",
            TargetId::AppArchive => "archive the .app preserving symlinks",
            TargetId::Runtime => "fetch and extract the pinned base runtime",
            TargetId::AppImage => "assemble the Linux AppImage",
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetId::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| {
                format!(
                    "unknown target `{}` (known targets: {})",
                    s,
                    TargetId::ALL.map(|t| t.name()).join(", ")
                )
            })
    }
}
