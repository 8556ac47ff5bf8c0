//! Source distribution stage.
//!
//! The package manager names its archive after the project version; that name
//! never leaks into the pipeline. The newest archive matching
//! `sdist.tool_output` is verified and copied to the canonical artifact.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    graph::Input,
    settings::Settings,
    utils::{fs, process::ToolCommand},
};
use flate2::read::GzDecoder;
use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

/// Declared inputs of the sdist target.
pub fn inputs(settings: &Settings) -> Vec<Input> {
    let mut inputs = vec![
        Input::file(settings.resolve(&settings.sdist().lock_file)),
        Input::file(settings.resolve(&settings.resources().output)),
    ];
    inputs.extend(
        settings
            .sources()
            .iter()
            .map(|pattern| Input::glob(settings.resolve_glob(pattern))),
    );
    inputs
}

/// Builds the source archive and installs it under its canonical name.
pub async fn build(settings: &Settings) -> Result<PathBuf> {
    let sdist = settings.sdist();
    let artifact = settings.sdist_artifact();
    let pattern = settings.resolve_glob(&sdist.tool_output);

    log::info!("Building source distribution for {}", settings.package_name());

    ToolCommand::from_argv(&sdist.command)?
        .current_dir(settings.root())
        .run()
        .await?;

    let produced = newest_match(&pattern, &artifact)?.ok_or_else(|| {
        Error::GenericError(format!(
            "`{}` succeeded but nothing matches {}",
            sdist.command.join(" "),
            pattern
        ))
    })?;
    log::debug!("Package manager wrote {}", produced.display());

    let module = settings.resolve(&settings.resources().output);
    let module_name = module
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    verify_archive(&produced, &module_name).await?;

    let staged = fs::staging_path(&artifact);
    fs::copy_file(&produced, &staged).await?;
    fs::promote(&staged, &artifact).await?;

    log::info!("✓ Created source distribution: {}", artifact.display());
    Ok(artifact)
}

/// Newest file matching `pattern`, ignoring the canonical artifact itself.
fn newest_match(pattern: &str, artifact: &Path) -> Result<Option<PathBuf>> {
    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in glob::glob(pattern)? {
        let Ok(path) = entry else { continue };
        if path == artifact || !path.is_file() {
            continue;
        }
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .fs_context("reading archive metadata", &path)?;
        if best.as_ref().is_none_or(|(t, _)| modified > *t) {
            best = Some((modified, path));
        }
    }
    Ok(best.map(|(_, p)| p))
}

/// Checks that `archive` is a gzip tarball containing a member named `module`.
pub async fn verify_archive(archive: &Path, module: &str) -> Result<()> {
    let archive = archive.to_path_buf();
    let module = module.to_string();
    tokio::task::spawn_blocking(move || {
        let file =
            std::fs::File::open(&archive).fs_context("opening source archive", &archive)?;
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        let entries = tar
            .entries()
            .fs_context("reading source archive", &archive)?;
        for entry in entries {
            let entry = entry.fs_context("reading source archive entry", &archive)?;
            let path = entry
                .path()
                .fs_context("reading source archive entry path", &archive)?;
            if path.file_name().is_some_and(|n| n.to_string_lossy() == module) {
                return Ok(());
            }
        }
        Err(Error::GenericError(format!(
            "source archive {} does not contain the generated module `{}`",
            archive.display(),
            module
        )))
    })
    .await?
}
