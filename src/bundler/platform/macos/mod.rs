//! macOS application bundle targets.
//!
//! - [`app`] - bundler spec rendering and `.app` assembly
//! - [`fixup`] - code-signing layout scan and repair
//! - [`macho`] - Mach-O slice inspection and thinning
//! - [`sign`] - ad-hoc (or identity) signature
//! - [`archive`] - symlink-preserving zip of the bundle

pub mod app;
pub mod archive;
pub mod fixup;
pub mod macho;
pub mod sign;

use crate::bundler::settings::{MacArch, Settings};
use std::path::{Path, PathBuf};

/// An assembled `.app` directory and what is known about its layout.
#[derive(Debug, Clone)]
pub struct AppBundle {
    root: PathBuf,
    executable: String,
    target_arch: Option<MacArch>,
}

impl AppBundle {
    /// Describes the bundle at `root` whose main executable is
    /// `Contents/MacOS/<executable>`.
    pub fn new(root: impl Into<PathBuf>, executable: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            executable: executable.into(),
            target_arch: None,
        }
    }

    /// Bundle described by the pipeline settings (`dist/<App>.app`).
    pub fn from_settings(settings: &Settings) -> Self {
        let mut bundle = Self::new(settings.app_bundle(), settings.product_name());
        bundle.target_arch = settings.macos().and_then(|m| m.target_arch);
        bundle
    }

    /// Requires every Mach-O file to carry exactly the slices of `arch`.
    pub fn with_target_arch(mut self, arch: Option<MacArch>) -> Self {
        self.target_arch = arch;
        self
    }

    /// Bundle root (`<App>.app`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configured architecture, `None` for host-native.
    pub fn target_arch(&self) -> Option<MacArch> {
        self.target_arch
    }

    /// `Contents/MacOS/<executable>`.
    pub fn main_executable(&self) -> PathBuf {
        self.root.join("Contents/MacOS").join(&self.executable)
    }

    /// `Contents/Frameworks`.
    pub fn frameworks_dir(&self) -> PathBuf {
        self.root.join("Contents/Frameworks")
    }

    /// Canonical location of the framework named `name` (`QtCore.framework`).
    pub fn canonical_framework(&self, name: &str) -> PathBuf {
        self.frameworks_dir().join(name)
    }
}
