//! Core Settings struct and implementations.

use super::{
    LinuxSettings, MacOsSettings, ProjectSettings, ResourceSettings, SdistSettings, host_machine,
};
use crate::bundler::graph::StalenessPolicy;
use std::path::{Path, PathBuf};

/// On-disk layout of the pipeline file.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct PipelineFile {
    pub project: ProjectSettings,
    #[serde(default)]
    pub pipeline: PipelineOptions,
    pub resources: ResourceSettings,
    pub sdist: SdistSettings,
    #[serde(default)]
    pub macos: Option<MacOsSettings>,
    #[serde(default)]
    pub linux: Option<LinuxSettings>,
}

/// `[pipeline]` table.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct PipelineOptions {
    #[serde(default)]
    pub staleness: StalenessPolicy,
}

/// Main settings for pipeline operations.
///
/// Constructed via [`SettingsBuilder`](super::SettingsBuilder). Every path
/// accessor returns an absolute path: relative paths in the pipeline file are
/// resolved against the directory containing it.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_pipeline::bundler::SettingsBuilder;
///
/// # fn example() -> kodegen_bundler_pipeline::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .config_path("packaging.toml")
///     .build()?;
/// println!("artifacts go to {}", settings.dist_dir().display());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Settings {
    /// Directory of the pipeline file.
    root: PathBuf,

    /// The pipeline file itself.
    config: PathBuf,

    /// Parsed pipeline file.
    file: PipelineFile,

    /// Effective staleness policy (CLI override or file value).
    staleness: StalenessPolicy,

    /// Image builder override (`--appimagetool` / `APPIMAGETOOL`).
    appimagetool: Option<String>,
}

impl Settings {
    /// Creates a new Settings instance (used by SettingsBuilder).
    pub(super) fn new(
        root: PathBuf,
        config: PathBuf,
        file: PipelineFile,
        staleness: Option<StalenessPolicy>,
        appimagetool: Option<String>,
    ) -> Self {
        let staleness = staleness.unwrap_or(file.pipeline.staleness);
        Self {
            root,
            config,
            file,
            staleness,
            appimagetool,
        }
    }

    /// Project root (directory of the pipeline file).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pipeline file path; every target that renders configuration depends on it.
    pub fn config_file(&self) -> &Path {
        &self.config
    }

    /// Resolves a configured path against the project root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Glob pattern for a configured pattern relative to the project root.
    pub fn resolve_glob(&self, pattern: &str) -> String {
        crate::bundler::utils::fs::glob_under(&self.root, pattern)
    }

    /// Returns the distribution name.
    pub fn package_name(&self) -> &str {
        &self.file.project.name
    }

    /// Returns the product name shown to users.
    pub fn product_name(&self) -> &str {
        self.file
            .project
            .app_name
            .as_deref()
            .unwrap_or(&self.file.project.name)
    }

    /// Returns the version string, if configured.
    pub fn version_string(&self) -> Option<&str> {
        self.file.project.version.as_deref()
    }

    /// Application source patterns.
    pub fn sources(&self) -> &[String] {
        &self.file.project.sources
    }

    /// Directory receiving the final artifacts.
    pub fn dist_dir(&self) -> PathBuf {
        self.resolve(&self.file.project.dist_dir)
    }

    /// Scratch directory.
    pub fn build_dir(&self) -> PathBuf {
        self.resolve(&self.file.project.build_dir)
    }

    /// Persisted content-hash state.
    pub fn state_file(&self) -> PathBuf {
        self.build_dir().join(".pipeline-state.json")
    }

    /// Staleness policy in effect.
    pub fn staleness(&self) -> StalenessPolicy {
        self.staleness
    }

    /// Resource compiler configuration.
    pub fn resources(&self) -> &ResourceSettings {
        &self.file.resources
    }

    /// Source distribution configuration.
    pub fn sdist(&self) -> &SdistSettings {
        &self.file.sdist
    }

    /// macOS configuration, when the macOS targets are enabled.
    pub fn macos(&self) -> Option<&MacOsSettings> {
        self.file.macos.as_ref()
    }

    /// Linux configuration, when the AppImage targets are enabled.
    pub fn linux(&self) -> Option<&LinuxSettings> {
        self.file.linux.as_ref()
    }

    /// Canonical source archive path.
    pub fn sdist_artifact(&self) -> PathBuf {
        self.dist_dir().join(&self.file.sdist.artifact)
    }

    /// Application bundle path (`dist/<App>.app`).
    pub fn app_bundle(&self) -> PathBuf {
        self.dist_dir().join(format!("{}.app", self.product_name()))
    }

    /// Archived bundle path (`dist/<App>.app.zip`).
    pub fn app_archive(&self) -> PathBuf {
        self.dist_dir().join(format!("{}.app.zip", self.product_name()))
    }

    /// Portable image path (`dist/<App>.AppImage`).
    pub fn appimage_artifact(&self) -> PathBuf {
        self.dist_dir().join(format!("{}.AppImage", self.product_name()))
    }

    /// Extracted runtime directory, when Linux is configured.
    pub fn runtime_dir(&self) -> Option<PathBuf> {
        self.linux()
            .map(|linux| self.build_dir().join(&linux.runtime.dir))
    }

    /// Version marker written after a successful extraction.
    pub fn runtime_marker(&self) -> Option<PathBuf> {
        self.linux()
            .map(|linux| self.build_dir().join(format!("{}.json", linux.runtime.dir)))
    }

    /// Cached download of the runtime image.
    pub fn runtime_image(&self) -> Option<PathBuf> {
        let linux = self.linux()?;
        let name = linux
            .runtime
            .url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("runtime.AppImage");
        Some(self.build_dir().join(name))
    }

    /// Image builder program.
    ///
    /// Precedence: `--appimagetool`/`APPIMAGETOOL`, then `[linux.appimage].tool`,
    /// then `appimagetool-<machine>.AppImage`.
    pub fn appimagetool(&self) -> String {
        self.appimagetool
            .clone()
            .or_else(|| self.linux().and_then(|l| l.appimage.tool.clone()))
            .unwrap_or_else(|| format!("appimagetool-{}.AppImage", host_machine()))
    }
}
