//! Linux platform-specific settings.

use std::path::PathBuf;

/// Linux targets (`[linux]`).
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinuxSettings {
    /// Pinned base runtime image.
    pub runtime: RuntimeSettings,

    /// AppImage assembly.
    pub appimage: AppImageSettings,
}

/// Base runtime image pin.
///
/// The runtime is a relocatable interpreter distributed as an AppImage. It is
/// downloaded once into the build directory and extracted next to it.
///
/// # Configuration
///
/// ```toml
/// [linux.runtime]
/// version = "3.9.1"
/// url = "https://github.com/niess/python-appimage/releases/download/python3.9/python3.9.1-cp39-cp39-manylinux2014_x86_64.AppImage"
/// python = "opt/python3.9/bin/python3.9"
/// ```
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeSettings {
    /// Pinned version. A cache extracted from any other version is an error.
    pub version: semver::Version,

    /// Download URL (`https://` or `file://`).
    pub url: String,

    /// Expected SHA-256 of the downloaded image.
    ///
    /// Default: None (not verified)
    #[serde(default)]
    pub sha256: Option<String>,

    /// Interpreter path relative to the extracted runtime root.
    pub python: PathBuf,

    /// Extracted runtime directory name under the build directory.
    ///
    /// Default: `appdir`
    #[serde(default = "default_runtime_dir")]
    pub dir: String,
}

/// AppImage desktop integration and builder.
///
/// # Desktop Integration
///
/// The runtime ships its own desktop entry and AppStream metadata; both are
/// replaced by `desktop_file` and `appdata_file`. `launcher` becomes `AppRun`.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppImageSettings {
    /// Desktop entry (`.desktop`).
    pub desktop_file: PathBuf,

    /// AppStream metadata (`.appdata.xml`).
    pub appdata_file: PathBuf,

    /// Launcher script installed as the image entry point.
    pub launcher: PathBuf,

    /// Icon copied to the image root, referenced by the desktop entry.
    ///
    /// Default: None
    #[serde(default)]
    pub icon: Option<PathBuf>,

    /// Image builder binary; `APPIMAGETOOL` takes precedence.
    ///
    /// Default: `appimagetool-<machine>.AppImage`
    #[serde(default)]
    pub tool: Option<String>,
}

fn default_runtime_dir() -> String {
    "appdir".to_string()
}
