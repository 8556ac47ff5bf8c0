//! Main pipeline orchestration.
//!
//! [`Pipeline`] turns [`Settings`] into a [`BuildGraph`] of [`TargetId`]s and
//! acts as the graph's [`StageRunner`], dispatching each stale target to its
//! platform stage.

use super::{checksum::calculate_sha256, tool_detection};
use crate::bundler::{
    Error, Result, Settings,
    error::ErrorExt,
    graph::{BuildGraph, BuildReport, Freshness, Input, StageRunner, StalenessChecker, Target},
    platform::{
        TargetId,
        linux::{RuntimeWorkspace, appimage, runtime},
        macos::{app, archive},
        resources, sdist,
    },
    utils::{
        fs,
        http::{Downloader, HttpDownloader},
    },
};
use std::path::PathBuf;
use walkdir::WalkDir;

/// An artifact present after a build.
#[derive(Debug, Clone)]
pub struct BuiltArtifact {
    /// Target that produced it
    pub target: TargetId,
    /// Artifact path (file or `.app` directory)
    pub path: PathBuf,
    /// Size in bytes (sum of files for directories)
    pub size: u64,
    /// SHA-256 of the file, or of the tree for directories
    pub checksum: String,
    /// Whether this run produced it
    pub rebuilt: bool,
}

/// Result of [`Pipeline::build`].
#[derive(Debug, Clone)]
pub struct BuildSummary {
    /// Per-target outcomes in execution order
    pub report: BuildReport<TargetId>,
    /// Distributable artifacts of the evaluated targets
    pub artifacts: Vec<BuiltArtifact>,
}

/// Main pipeline orchestrator.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_pipeline::bundler::{Pipeline, SettingsBuilder, TargetId};
///
/// # async fn example() -> kodegen_bundler_pipeline::bundler::Result<()> {
/// let settings = SettingsBuilder::new().config_path("packaging.toml").build()?;
/// let mut pipeline = Pipeline::new(settings);
///
/// let summary = pipeline.build(&[TargetId::AppArchive]).await?;
/// for artifact in summary.artifacts {
///     println!("{} ({} bytes) {}", artifact.path.display(), artifact.size, artifact.checksum);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pipeline<D = HttpDownloader> {
    settings: Settings,
    downloader: D,
    workspace: Option<RuntimeWorkspace>,
}

impl Pipeline<HttpDownloader> {
    /// Creates a pipeline that downloads over HTTP.
    pub fn new(settings: Settings) -> Self {
        Self::with_downloader(settings, HttpDownloader)
    }
}

impl<D: Downloader> Pipeline<D> {
    /// Creates a pipeline with a custom runtime downloader.
    pub fn with_downloader(settings: Settings, downloader: D) -> Self {
        Self {
            settings,
            downloader,
            workspace: None,
        }
    }

    /// Returns a reference to the pipeline settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the runtime downloader.
    pub fn downloader(&self) -> &D {
        &self.downloader
    }

    /// Targets enabled by the configuration, leaf first.
    pub fn targets(&self) -> Vec<TargetId> {
        TargetId::ALL
            .into_iter()
            .filter(|t| self.is_configured(*t))
            .collect()
    }

    fn is_configured(&self, target: TargetId) -> bool {
        match target {
            TargetId::Resources | TargetId::Sdist => true,
            TargetId::AppBundle | TargetId::AppArchive => self.settings.macos().is_some(),
            TargetId::Runtime | TargetId::AppImage => self.settings.linux().is_some(),
        }
    }

    /// Declares every configured target and its inputs.
    pub fn graph(&self) -> Result<BuildGraph<TargetId>> {
        let s = &self.settings;
        let mut graph = BuildGraph::new();

        graph.add_target(Target::new(
            TargetId::Resources,
            s.resolve(&s.resources().output),
            resources::inputs(s),
        ))?;
        graph.add_target(Target::new(
            TargetId::Sdist,
            s.sdist_artifact(),
            sdist::inputs(s),
        ))?;

        if let Some(macos) = s.macos() {
            let mut inputs = app::inputs(s, macos);
            inputs.push(Input::file(s.config_file()));
            graph.add_target(Target::new(TargetId::AppBundle, s.app_bundle(), inputs))?;
            graph.add_target(Target::new(
                TargetId::AppArchive,
                s.app_archive(),
                vec![Input::file(s.app_bundle())],
            ))?;
        }

        if let Some(marker) = s.runtime_marker() {
            // The network fetch waits until every local stage has succeeded.
            let local = graph.keys();
            graph.add_target(Target::new(TargetId::Runtime, marker, runtime::inputs(s)))?;
            for earlier in local {
                graph.order_after(earlier, TargetId::Runtime)?;
            }
            graph.add_target(Target::new(
                TargetId::AppImage,
                s.appimage_artifact(),
                appimage::inputs(s),
            ))?;
        }

        Ok(graph)
    }

    fn check_requested(&self, requested: &[TargetId]) -> Result<()> {
        for target in requested {
            if !self.is_configured(*target) {
                let table = match target {
                    TargetId::AppBundle | TargetId::AppArchive => "[macos]",
                    _ => "[linux]",
                };
                return Err(Error::Config(format!(
                    "target `{target}` requires a {table} table in {}",
                    self.settings.config_file().display()
                )));
            }
        }
        Ok(())
    }

    async fn checker(&self) -> Result<StalenessChecker> {
        StalenessChecker::new(self.settings.staleness(), self.settings.state_file()).await
    }

    /// Reports which targets a build of `requested` would run, and why.
    pub async fn plan(&self, requested: &[TargetId]) -> Result<Vec<(TargetId, Freshness)>> {
        self.check_requested(requested)?;
        let graph = self.graph()?;
        let checker = self.checker().await?;
        graph.plan(requested, &checker).await
    }

    /// Brings `requested` (every configured target when empty) up to date.
    pub async fn build(&mut self, requested: &[TargetId]) -> Result<BuildSummary> {
        self.check_requested(requested)?;
        let graph = self.graph()?;
        let mut checker = self.checker().await?;

        log::info!(
            "Evaluating {} with {:?} staleness",
            describe(requested),
            self.settings.staleness()
        );
        for target in graph.execution_order(requested)? {
            for tool in tool_detection::missing_tools(&self.settings, target) {
                log::debug!("`{}` needs `{}`, which is not on PATH", target, tool);
            }
        }

        let report = graph.run(requested, &mut checker, self).await?;
        self.workspace = None;

        let rebuilt = report.built();
        let mut artifacts = Vec::new();
        for (target, _) in report.outcomes() {
            if !target.is_artifact() {
                continue;
            }
            let Some(path) = graph.target(*target).map(|t| t.output().to_path_buf()) else {
                continue;
            };
            artifacts.push(BuiltArtifact {
                target: *target,
                size: artifact_size(&path).await?,
                checksum: calculate_sha256(&path).await?,
                rebuilt: rebuilt.contains(target),
                path,
            });
        }

        Ok(BuildSummary { report, artifacts })
    }

    /// Removes generated artifacts and the build state.
    ///
    /// The extracted runtime and its cached image are only removed with
    /// `runtime`, which is also the only way to change the pinned version.
    pub async fn clean(&self, runtime: bool) -> Result<Vec<PathBuf>> {
        let s = &self.settings;
        let mut candidates = vec![
            s.resolve(&s.resources().output),
            s.sdist_artifact(),
            s.state_file(),
        ];
        if s.macos().is_some() {
            candidates.push(s.app_bundle());
            candidates.push(s.app_archive());
            candidates.push(app::spec_path(s));
            candidates.push(s.build_dir().join("pyinstaller"));
        }
        if s.linux().is_some() {
            candidates.push(s.appimage_artifact());
        }

        let mut removed = Vec::new();
        for path in candidates {
            if tokio::fs::symlink_metadata(&path).await.is_ok() {
                fs::remove_any(&path).await?;
                log::debug!("Removed {}", path.display());
                removed.push(path);
            }
        }

        if runtime {
            runtime::clean(s).await?;
            if let Some(dir) = s.runtime_dir() {
                removed.push(dir);
            }
        }
        Ok(removed)
    }
}

impl<D: Downloader> StageRunner<TargetId> for Pipeline<D> {
    async fn run_stage(&mut self, target: &Target<TargetId>) -> Result<()> {
        let settings = &self.settings;
        match target.key() {
            TargetId::Resources => {
                resources::compile(settings).await?;
            }
            TargetId::Sdist => {
                sdist::build(settings).await?;
            }
            TargetId::AppBundle => {
                let report = app::build(settings).await?;
                for moved in &report.moves {
                    log::info!("  moved {} -> {}", moved.from.display(), moved.to.display());
                }
            }
            TargetId::AppArchive => {
                archive::archive_bundle(&settings.app_bundle(), &settings.app_archive()).await?;
            }
            TargetId::Runtime => {
                let workspace = runtime::ensure_runtime(settings, &self.downloader).await?;
                self.workspace = Some(workspace);
            }
            TargetId::AppImage => {
                let workspace = match self.workspace.take() {
                    Some(workspace) => workspace,
                    None => RuntimeWorkspace::acquire(settings).await?,
                };
                appimage::assemble(settings, workspace).await?;
            }
        }
        Ok(())
    }
}

fn describe(requested: &[TargetId]) -> String {
    if requested.is_empty() {
        "all targets".to_string()
    } else {
        requested
            .iter()
            .map(|t| format!("`{t}`"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// File size, or the sum of regular file sizes below a directory.
async fn artifact_size(path: &std::path::Path) -> Result<u64> {
    let metadata = tokio::fs::metadata(path)
        .await
        .fs_context("reading artifact metadata", path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }

    let root = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<u64> {
        let mut size = 0;
        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = entry?;
            if entry.file_type().is_file() {
                size += entry.metadata()?.len();
            }
        }
        Ok(size)
    })
    .await?
}
