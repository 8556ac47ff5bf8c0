//! AppImage assembly - portable Linux application.
//!
//! Installs the source distribution into the extracted base runtime, swaps
//! the runtime's desktop integration for the application's own, installs the
//! launcher as `AppRun` and hands the tree to the image builder.
//!
//! # Process
//!
//! 1. `<runtime>/<python> -m pip install <sdist>`
//! 2. Remove the runtime's desktop entries and AppStream metadata
//! 3. Copy the application's desktop entry, metadata and icon
//! 4. Replace `AppRun` with the launcher (mode 0755)
//! 5. `ARCH=<machine> <appimagetool> <runtime> <tmp>`
//! 6. Rename the builder output to `dist/<App>.AppImage` (mode 0755)
//!
//! Every step depends on the previous one, so any failure stops the
//! sequence and discards the runtime workspace.

use super::runtime::RuntimeWorkspace;
use crate::bundler::{
    error::{Error, Result},
    graph::Input,
    settings::{AppImageSettings, Settings, host_machine},
    utils::{fs, process::ToolCommand},
};
use std::path::{Path, PathBuf};

/// Runtime metadata removed in step 2, relative to the runtime root.
const FOREIGN_METADATA: [&str; 3] = [
    "*.desktop",
    "usr/share/applications/*.desktop",
    "usr/share/metainfo/*.xml",
];

/// Declared inputs of the appimage target.
pub fn inputs(settings: &Settings) -> Vec<Input> {
    let mut inputs = vec![Input::file(settings.sdist_artifact())];
    if let Some(marker) = settings.runtime_marker() {
        inputs.push(Input::file(marker));
    }
    if let Some(linux) = settings.linux() {
        let appimage = &linux.appimage;
        inputs.push(Input::file(settings.resolve(&appimage.desktop_file)));
        inputs.push(Input::file(settings.resolve(&appimage.appdata_file)));
        inputs.push(Input::file(settings.resolve(&appimage.launcher)));
        if let Some(icon) = &appimage.icon {
            inputs.push(Input::file(settings.resolve(icon)));
        }
    }
    inputs
}

/// Assembles the AppImage from `workspace`.
///
/// The workspace is consumed: on failure it is discarded (no rollback of the
/// partial mutation) and the next run starts from a fresh extraction.
pub async fn assemble(settings: &Settings, workspace: RuntimeWorkspace) -> Result<PathBuf> {
    let appimage = &settings
        .linux()
        .ok_or_else(|| Error::Config("the appimage target requires a [linux] table".into()))?
        .appimage;

    match run_steps(settings, appimage, &workspace).await {
        Ok(artifact) => Ok(artifact),
        Err(e) => {
            if let Err(discard) = workspace.discard().await {
                log::warn!("Failed to discard runtime workspace: {}", discard);
            }
            Err(e)
        }
    }
}

async fn run_steps(
    settings: &Settings,
    appimage: &AppImageSettings,
    workspace: &RuntimeWorkspace,
) -> Result<PathBuf> {
    let root = workspace.root();
    let sdist = settings.sdist_artifact();

    log::info!("Building AppImage for {}", settings.product_name());

    // 1
    log::info!("Installing {} into the runtime", sdist.display());
    ToolCommand::new(workspace.python())
        .args(["-m", "pip", "install"])
        .arg(&sdist)
        .current_dir(root)
        .run()
        .await?;

    // 2
    let removed = remove_foreign_metadata(root).await?;
    log::debug!("Removed {} runtime metadata file(s)", removed);

    // 3
    install_desktop_integration(settings, appimage, root).await?;

    // 4
    let app_run = root.join("AppRun");
    fs::copy_file(&settings.resolve(&appimage.launcher), &app_run).await?;
    fs::make_executable(&app_run).await?;

    // 5
    let artifact = settings.appimage_artifact();
    let built = settings
        .build_dir()
        .join(format!("{}.AppImage.partial", settings.product_name()));
    fs::remove_file(&built).await?;

    let tool = settings.appimagetool();
    log::info!("Running {}", tool);
    ToolCommand::new(&tool)
        .arg(root)
        .arg(&built)
        .env("ARCH", host_machine())
        .current_dir(settings.build_dir())
        .run()
        .await?;
    if !built.is_file() {
        return Err(Error::GenericError(format!(
            "{} exited successfully but did not write {}",
            tool,
            built.display()
        )));
    }

    // 6
    fs::promote(&built, &artifact).await?;
    fs::make_executable(&artifact).await?;

    log::info!("✓ Created AppImage: {}", artifact.display());
    Ok(artifact)
}

/// Removes the runtime's own desktop entries and AppStream metadata.
///
/// Absent files are not an error. Returns how many files were removed.
pub async fn remove_foreign_metadata(root: &Path) -> Result<usize> {
    let mut removed = 0;
    for pattern in FOREIGN_METADATA {
        for path in glob::glob(&fs::glob_under(root, pattern))?.flatten() {
            if fs::remove_file(&path).await? {
                log::debug!("Removed {}", path.display());
                removed += 1;
            }
        }
    }
    Ok(removed)
}

async fn install_desktop_integration(
    settings: &Settings,
    appimage: &AppImageSettings,
    root: &Path,
) -> Result<()> {
    let desktop = settings.resolve(&appimage.desktop_file);
    let appdata = settings.resolve(&appimage.appdata_file);

    for dest in [
        root.join(file_name(&desktop)?),
        root.join("usr/share/applications").join(file_name(&desktop)?),
    ] {
        fs::copy_file(&desktop, &dest).await?;
    }
    fs::copy_file(
        &appdata,
        &root.join("usr/share/metainfo").join(file_name(&appdata)?),
    )
    .await?;

    if let Some(icon) = &appimage.icon {
        let icon = settings.resolve(icon);
        fs::copy_file(&icon, &root.join(file_name(&icon)?)).await?;
    }
    Ok(())
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name().ok_or_else(|| Error::MissingInput {
        path: path.to_path_buf(),
        reason: "not a file path".to_string(),
    })
}
