//! Artifact and input checksum calculation.
//!
//! SHA-256 over single files and over directory trees (the `.app` bundle,
//! the extracted runtime). Used for the artifact report and by the
//! content-hash staleness policy.

use crate::{bail, bundler::Result, bundler::error::ErrorExt};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Calculates SHA256 checksum of a file or directory.
///
/// Symlinks are hashed by their target text, never followed, so a change in
/// link structure changes the digest.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash (64 characters)
/// * `Err` - If path cannot be read or is neither file nor directory
pub async fn calculate_sha256(path: &Path) -> Result<String> {
    let metadata = tokio::fs::symlink_metadata(path)
        .await
        .fs_context("reading metadata for hashing", path)?;

    if metadata.is_file() {
        calculate_file_sha256(path).await
    } else if metadata.is_dir() {
        calculate_directory_sha256(path).await
    } else if metadata.file_type().is_symlink() {
        let target = tokio::fs::read_link(path)
            .await
            .fs_context("reading symlink for hashing", path)?;
        Ok(hex::encode(Sha256::digest(
            target.to_string_lossy().as_bytes(),
        )))
    } else {
        bail!("Path is neither file nor directory: {}", path.display())
    }
}

/// Calculates SHA256 checksum of a single file in 8KB chunks.
async fn calculate_file_sha256(file_path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    hash_file_into(file_path, &mut hasher).await?;
    Ok(hex::encode(hasher.finalize()))
}

async fn hash_file_into(file_path: &Path, hasher: &mut Sha256) -> Result<()> {
    let mut file = tokio::fs::File::open(file_path)
        .await
        .fs_context("opening file for hashing", file_path)?;
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", file_path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(())
}

/// Calculates SHA256 checksum of a directory tree.
///
/// # Algorithm
///
/// 1. Collect every entry with walkdir (links not followed)
/// 2. Sort paths lexicographically for deterministic order
/// 3. Files: hash(relative_path + content); symlinks: hash(relative_path + "->" + target);
///    directories: hash(relative_path + "/")
/// 4. Return final combined hash
async fn calculate_directory_sha256(dir_path: &Path) -> Result<String> {
    let mut entries = Vec::new();
    for entry in walkdir::WalkDir::new(dir_path).follow_links(false).min_depth(1) {
        entries.push(entry?);
    }
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    let mut hasher = Sha256::new();

    for entry in entries {
        let rel_path = entry.path().strip_prefix(dir_path)?;
        hasher.update(rel_path.to_string_lossy().as_bytes());

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = tokio::fs::read_link(entry.path())
                .await
                .fs_context("reading symlink for hashing", entry.path())?;
            hasher.update(b"->");
            hasher.update(target.to_string_lossy().as_bytes());
        } else if file_type.is_dir() {
            hasher.update(b"/");
        } else if file_type.is_file() {
            hash_file_into(entry.path(), &mut hasher).await?;
        }
    }

    Ok(hex::encode(hasher.finalize()))
}
