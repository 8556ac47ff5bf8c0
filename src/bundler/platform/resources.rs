//! Resource compiler stage.
//!
//! Turns the `.qrc` manifest and the assets it lists into one generated
//! module. Every `<file>` entry of the manifest is an implicit input, next to
//! the configured asset globs, so editing any listed asset reruns the stage.

use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    graph::Input,
    settings::Settings,
    utils::{fs, process::ToolCommand},
};
use regex::Regex;
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

static FILE_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<file(?:\s[^>]*)?>\s*([^<]+?)\s*</file>").expect("static regex is valid")
});

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex is valid"));

/// Paths named by `<file>` entries, resolved against the manifest directory.
///
/// Commented-out entries are ignored and predefined XML entities decoded.
pub fn manifest_assets(manifest: &Path, text: &str) -> Vec<PathBuf> {
    let base = manifest.parent().unwrap_or_else(|| Path::new("."));
    let text = COMMENT.replace_all(text, "");
    FILE_ENTRY
        .captures_iter(&text)
        .map(|c| base.join(unescape(&c[1])))
        .collect()
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Declared inputs of the resources target.
///
/// A missing manifest still yields the manifest itself as an input so the
/// run reports it as a missing input.
pub fn inputs(settings: &Settings) -> Vec<Input> {
    let resources = settings.resources();
    let manifest = settings.resolve(&resources.manifest);

    let mut inputs = vec![Input::file(&manifest)];
    if let Ok(text) = std::fs::read_to_string(&manifest) {
        inputs.extend(manifest_assets(&manifest, &text).into_iter().map(Input::File));
    }
    inputs.extend(
        resources
            .assets
            .iter()
            .map(|pattern| Input::glob(settings.resolve_glob(pattern))),
    );
    inputs
}

/// Compiles the manifest into the generated module.
///
/// The compiler writes to a staging path that is promoted only on success.
pub async fn compile(settings: &Settings) -> Result<PathBuf> {
    let resources = settings.resources();
    let manifest = settings.resolve(&resources.manifest);
    let output = settings.resolve(&resources.output);

    let text = match tokio::fs::read_to_string(&manifest).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::MissingInput {
                path: manifest,
                reason: "resource manifest not found".to_string(),
            });
        }
        Err(e) => return Err(e).fs_context("reading resource manifest", &manifest),
    };

    for asset in manifest_assets(&manifest, &text) {
        if !asset.is_file() {
            return Err(Error::MissingInput {
                path: asset,
                reason: format!("listed in {}", manifest.display()),
            });
        }
    }

    let staged = fs::staging_path(&output);
    fs::remove_file(&staged).await?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent, false).await?;
    }

    log::info!("Compiling resources from {}", manifest.display());

    let manifest_dir = manifest
        .parent()
        .context("resource manifest has no parent directory")?;
    let result = ToolCommand::from_argv(&resources.compiler)?
        .arg(&manifest)
        .arg("-o")
        .arg(&staged)
        .current_dir(manifest_dir)
        .run()
        .await;

    if let Err(e) = result {
        fs::remove_file(&staged).await?;
        return Err(e);
    }

    if !staged.is_file() {
        return Err(Error::GenericError(format!(
            "resource compiler exited successfully but wrote nothing to {}",
            staged.display()
        )));
    }

    fs::promote(&staged, &output).await?;
    log::info!("✓ Generated {}", output.display());
    Ok(output)
}
