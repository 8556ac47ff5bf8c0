//! Project metadata and shared directories.

use std::path::PathBuf;

/// Project metadata and configuration.
///
/// Maps the `[project]` table of the pipeline file.
///
/// # Examples
///
/// ```toml
/// [project]
/// name = "runekit"
/// app_name = "RuneKit"
/// version = "0.1.0"
/// sources = ["pyproject.toml", "runekit/**/*.py"]
/// ```
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSettings {
    /// Distribution name, used for the source archive.
    pub name: String,

    /// Product name displayed to users (`<app_name>.app`, `<app_name>.AppImage`).
    ///
    /// Default: `name`
    #[serde(default)]
    pub app_name: Option<String>,

    /// Version string, informational.
    #[serde(default)]
    pub version: Option<String>,

    /// Directory receiving the final artifacts.
    ///
    /// Default: `dist`
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,

    /// Scratch directory for intermediate state and the cached runtime.
    ///
    /// Default: `build`
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Application sources (paths or glob patterns).
    ///
    /// Declared inputs of both the source distribution and the app bundle.
    #[serde(default)]
    pub sources: Vec<String>,
}

fn default_dist_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}
