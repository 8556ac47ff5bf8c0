//! File system utilities for pipeline stages.
//!
//! Idempotent removal, symlink-preserving copies, and the temp-then-rename
//! promotion every stage uses so that a failed run never leaves a partial
//! artifact at its declared output path.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

/// Creates all of the directories of the specified path, erasing it first if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        remove_dir_all(path).await?;
    }

    // create_dir_all is already idempotent - succeeds even if dir exists
    fs::create_dir_all(path)
        .await
        .fs_context("creating directory", path)
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()), // Idempotent
        Err(e) => Err(e).fs_context("removing directory", path),
    }
}

/// Removes a file or symlink if it exists.
///
/// Returns whether something was removed.
pub async fn remove_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false), // Idempotent
        Err(e) => Err(e).fs_context("removing file", path),
    }
}

/// Removes whatever is at `path` (file, symlink or directory tree).
pub async fn remove_any(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => remove_dir_all(path).await,
        Ok(_) => remove_file(path).await.map(|_| ()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).fs_context("inspecting path", path),
    }
}

/// Copies a regular file from one path to another, creating any parent
/// directories of the destination path as necessary.
///
/// An existing destination (including a symlink) is unlinked first, so the
/// copy never writes through a link.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        return Err(Error::MissingInput {
            path: from.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("creating destination directory", dest_dir)?;
    }
    remove_file(to).await?;
    fs::copy(from, to).await.fs_context("copying file", to)?;
    Ok(())
}

/// Marks a file executable (0755) on unix.
pub async fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .await
            .fs_context("setting executable permissions", path)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Sibling path used to stage an output before promotion.
///
/// `dist/runekit.tar.gz` stages at `dist/.runekit.tar.gz.partial`.
pub fn staging_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}.partial"))
}

/// Moves a fully written staging path onto the declared output.
///
/// Whatever previously occupied `output` is removed first.
pub async fn promote(staged: &Path, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .await
            .fs_context("creating output directory", parent)?;
    }
    remove_any(output).await?;
    fs::rename(staged, output)
        .await
        .fs_context("promoting staged output", output)
}

/// Relative path from directory `from_dir` to `to`, both inside one tree.
///
/// Used to write symlinks that survive relocation of the bundle.
pub fn relative_path(from_dir: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from_dir.components().collect();
    let target: Vec<_> = to.components().collect();
    let common = from
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &target[common..] {
        rel.push(component.as_os_str());
    }
    rel
}

/// Creates a relative symlink at `link` pointing to `target`.
/// Glob pattern for `pattern` below `root`.
///
/// Metacharacters in `root` (`proj[1]`) match literally; absolute patterns
/// are returned unchanged.
pub fn glob_under(root: &Path, pattern: &str) -> String {
    if Path::new(pattern).is_absolute() {
        return pattern.to_string();
    }
    let root = glob::Pattern::escape(&root.to_string_lossy());
    Path::new(&root).join(pattern).to_string_lossy().into_owned()
}

#[cfg(unix)]
pub async fn symlink_relative(target: &Path, link: &Path) -> Result<()> {
    let parent = link
        .parent()
        .ok_or_else(|| Error::GenericError(format!("{} has no parent", link.display())))?;
    let rel = relative_path(parent, target);
    fs::symlink(&rel, link)
        .await
        .fs_context("creating symlink", link)
}

/// Creates a relative symlink at `link` pointing to `target`.
#[cfg(not(unix))]
pub async fn symlink_relative(target: &Path, link: &Path) -> Result<()> {
    Err(Error::GenericError(format!(
        "cannot link {} to {}: symlinks require a unix host",
        link.display(),
        target.display()
    )))
}
