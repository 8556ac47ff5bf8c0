//! Base runtime fetch.
//!
//! The runtime image is a relocatable interpreter packaged as an AppImage.
//! It is downloaded once into the build directory, extracted with
//! `--appimage-extract`, and stamped with a version marker written last.
//! The marker is what makes an extraction trustworthy: a runtime directory
//! without one is discarded and extracted again.

use crate::bundler::{
    builder::checksum::calculate_sha256,
    error::{Error, ErrorExt, Result},
    graph::Input,
    settings::{RuntimeSettings, Settings},
    utils::{fs, http::Downloader, process::ToolCommand},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name `--appimage-extract` writes into.
const EXTRACT_DIR: &str = "squashfs-root";

/// Contents of `<runtime-dir>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeMarker {
    /// Pinned version the directory was extracted from
    pub version: semver::Version,
    /// Download URL
    pub url: String,
    /// SHA-256 of the image
    pub sha256: String,
    /// Extraction time
    pub extracted_at: DateTime<Utc>,
}

/// An extracted, version-checked runtime directory.
///
/// Owned by whichever stage is mutating it. Consuming it with
/// [`discard`](Self::discard) invalidates the extraction so the next run
/// re-extracts before assembling again.
#[derive(Debug)]
pub struct RuntimeWorkspace {
    root: PathBuf,
    marker: PathBuf,
    version: semver::Version,
    python: PathBuf,
}

impl RuntimeWorkspace {
    fn new(settings: &Settings, runtime: &RuntimeSettings) -> Result<Self> {
        let (Some(root), Some(marker)) = (settings.runtime_dir(), settings.runtime_marker()) else {
            return Err(Error::Config("the runtime target requires a [linux] table".into()));
        };
        Ok(Self {
            python: root.join(&runtime.python),
            root,
            marker,
            version: runtime.version.clone(),
        })
    }

    /// Takes ownership of an already fetched runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingInput`] when the runtime has not been fetched
    /// - [`Error::RuntimeVersionMismatch`] when it was fetched for another pin
    pub async fn acquire(settings: &Settings) -> Result<Self> {
        let runtime = runtime_settings(settings)?;
        let workspace = Self::new(settings, runtime)?;
        match read_marker(&workspace.marker).await? {
            Some(marker) if marker.version == workspace.version && workspace.root.is_dir() => {
                Ok(workspace)
            }
            Some(marker) if marker.version != workspace.version => {
                Err(Error::RuntimeVersionMismatch {
                    dir: workspace.root,
                    expected: workspace.version,
                    found: marker.version.to_string(),
                })
            }
            _ => Err(Error::MissingInput {
                path: workspace.root,
                reason: "runtime has not been fetched".to_string(),
            }),
        }
    }

    /// Extracted runtime root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pinned version.
    pub fn version(&self) -> &semver::Version {
        &self.version
    }

    /// Interpreter inside the runtime.
    pub fn python(&self) -> &Path {
        &self.python
    }

    /// Invalidates the runtime by removing its marker.
    pub async fn discard(self) -> Result<()> {
        log::warn!(
            "Discarding runtime {}; it will be re-extracted on the next run",
            self.root.display()
        );
        fs::remove_file(&self.marker).await.map(|_| ())
    }
}

fn runtime_settings(settings: &Settings) -> Result<&RuntimeSettings> {
    settings
        .linux()
        .map(|linux| &linux.runtime)
        .ok_or_else(|| Error::Config("the runtime target requires a [linux] table".into()))
}

async fn read_marker(path: &Path) -> Result<Option<RuntimeMarker>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).fs_context("reading runtime marker", path),
    };
    match serde_json::from_str(&text) {
        Ok(marker) => Ok(Some(marker)),
        Err(e) => {
            log::warn!("Ignoring unreadable runtime marker {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Declared inputs of the runtime target.
pub fn inputs(settings: &Settings) -> Vec<Input> {
    vec![Input::file(settings.config_file())]
}

/// Makes sure the pinned runtime is extracted and returns it.
///
/// - marker present, same version: nothing happens
/// - marker present, other version: [`Error::RuntimeVersionMismatch`]
/// - directory present without a usable marker: discarded and re-extracted
/// - otherwise: downloaded (unless cached) and extracted
pub async fn ensure_runtime<D: Downloader>(
    settings: &Settings,
    downloader: &D,
) -> Result<RuntimeWorkspace> {
    let runtime = runtime_settings(settings)?;
    let workspace = RuntimeWorkspace::new(settings, runtime)?;

    if let Some(marker) = read_marker(&workspace.marker).await? {
        if marker.version != runtime.version {
            return Err(Error::RuntimeVersionMismatch {
                dir: workspace.root,
                expected: runtime.version.clone(),
                found: marker.version.to_string(),
            });
        }
        if workspace.root.is_dir() {
            log::debug!(
                "Runtime {} already extracted at {}",
                runtime.version,
                workspace.root.display()
            );
            return Ok(workspace);
        }
        log::warn!("Runtime marker present but {} is missing", workspace.root.display());
        fs::remove_file(&workspace.marker).await?;
    }

    if workspace.root.exists() {
        log::warn!(
            "Discarding unverified runtime directory {}",
            workspace.root.display()
        );
        fs::remove_dir_all(&workspace.root).await?;
    }

    let build_dir = settings.build_dir();
    fs::create_dir_all(&build_dir, false).await?;
    let image = settings
        .runtime_image()
        .ok_or_else(|| Error::Config("the runtime target requires a [linux] table".into()))?;

    if image.is_file() {
        log::debug!("Using cached runtime image {}", image.display());
    } else {
        log::info!("Fetching runtime {} from {}", runtime.version, runtime.url);
        let staged = fs::staging_path(&image);
        downloader.download(&runtime.url, &staged).await?;
        fs::promote(&staged, &image).await?;
    }

    let digest = calculate_sha256(&image).await?;
    if let Some(expected) = &runtime.sha256 {
        if !digest.eq_ignore_ascii_case(expected) {
            fs::remove_file(&image).await?;
            return Err(Error::NetworkFailure {
                url: runtime.url.clone(),
                reason: format!("SHA-256 mismatch: expected {expected}, got {digest}"),
            });
        }
    }

    fs::make_executable(&image).await?;
    let extracted = build_dir.join(EXTRACT_DIR);
    fs::remove_dir_all(&extracted).await?;

    log::info!("Extracting {}", image.display());
    ToolCommand::new(&image)
        .arg("--appimage-extract")
        .current_dir(&build_dir)
        .run()
        .await?;
    if !extracted.is_dir() {
        return Err(Error::GenericError(format!(
            "{} --appimage-extract did not produce {}",
            image.display(),
            extracted.display()
        )));
    }
    tokio::fs::rename(&extracted, &workspace.root)
        .await
        .fs_context("moving extracted runtime", &workspace.root)?;

    let marker = RuntimeMarker {
        version: runtime.version.clone(),
        url: runtime.url.clone(),
        sha256: digest,
        extracted_at: Utc::now(),
    };
    let staged = fs::staging_path(&workspace.marker);
    tokio::fs::write(&staged, serde_json::to_vec_pretty(&marker)?)
        .await
        .fs_context("writing runtime marker", &staged)?;
    fs::promote(&staged, &workspace.marker).await?;

    log::info!(
        "✓ Runtime {} ready at {}",
        runtime.version,
        workspace.root.display()
    );
    Ok(workspace)
}

/// Removes the extracted runtime, its marker and the cached image.
pub async fn clean(settings: &Settings) -> Result<()> {
    if let Some(dir) = settings.runtime_dir() {
        fs::remove_dir_all(&dir).await?;
    }
    if let Some(marker) = settings.runtime_marker() {
        fs::remove_file(&marker).await?;
    }
    if let Some(image) = settings.runtime_image() {
        fs::remove_file(&image).await?;
    }
    fs::remove_dir_all(&settings.build_dir().join(EXTRACT_DIR)).await
}
