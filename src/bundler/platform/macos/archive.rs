//! Zip archive of the application bundle.
//!
//! Equivalent to `ditto -c -k --sequesterRsrc --keepParent`: entries are
//! rooted at `<App>.app/`, links are stored as links, and unix modes are
//! kept so the executable bits and framework layout survive extraction.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    utils::fs,
};
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// Archives the bundle at `app` into `dest`.
///
/// The archive is written next to `dest` and promoted once complete.
pub async fn archive_bundle(app: &Path, dest: &Path) -> Result<PathBuf> {
    if !app.is_dir() {
        return Err(Error::MissingInput {
            path: app.to_path_buf(),
            reason: "application bundle has not been assembled".to_string(),
        });
    }

    log::info!("Archiving {}", app.display());

    let staged = fs::staging_path(dest);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent, false).await?;
    }

    let source = app.to_path_buf();
    let target = staged.clone();
    let written = tokio::task::spawn_blocking(move || write_archive(&source, &target)).await?;
    let entries = match written {
        Ok(entries) => entries,
        Err(e) => {
            fs::remove_file(&staged).await?;
            return Err(e);
        }
    };

    fs::promote(&staged, dest).await?;
    log::info!("✓ Archived {} entries into {}", entries, dest.display());
    Ok(dest.to_path_buf())
}

fn write_archive(app: &Path, dest: &Path) -> Result<usize> {
    let parent = app.parent().unwrap_or_else(|| Path::new(""));
    let file = std::fs::File::create(dest).fs_context("creating archive", dest)?;
    let mut zip = ZipWriter::new(io::BufWriter::new(file));
    let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0;

    for entry in WalkDir::new(app).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let name = entry_name(path.strip_prefix(parent)?);
        let meta = entry
            .path()
            .symlink_metadata()
            .fs_context("reading metadata", path)?;

        if meta.file_type().is_symlink() {
            let target = std::fs::read_link(path).fs_context("reading link", path)?;
            zip.add_symlink(
                name,
                target.to_string_lossy().into_owned(),
                base.unix_permissions(0o755),
            )?;
        } else if meta.is_dir() {
            zip.add_directory(name, base.unix_permissions(mode(&meta, 0o755)))?;
        } else {
            let options = base
                .unix_permissions(mode(&meta, 0o644))
                .large_file(meta.len() >= u64::from(u32::MAX));
            zip.start_file(name, options)?;
            let mut reader =
                std::fs::File::open(path).fs_context("opening bundle file", path)?;
            io::copy(&mut reader, &mut zip).fs_context("compressing bundle file", path)?;
        }
        entries += 1;
    }

    let mut writer = zip.finish()?;
    writer.flush().fs_context("writing archive", dest)?;
    Ok(entries)
}

/// Archive member name with `/` separators.
fn entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn mode(meta: &std::fs::Metadata, _default: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode(_meta: &std::fs::Metadata, default: u32) -> u32 {
    default
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{io::Read, os::unix::fs::symlink};

    #[tokio::test]
    async fn keeps_parent_and_links() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("RuneKit.app");
        let fw = app.join("Contents/Frameworks/QtCore.framework");
        std::fs::create_dir_all(fw.join("Versions/5")).unwrap();
        std::fs::write(fw.join("Versions/5/QtCore"), b"core").unwrap();
        symlink("5", fw.join("Versions/Current")).unwrap();

        let dest = dir.path().join("dist/RuneKit.app.zip");
        archive_bundle(&app, &dest).await.unwrap();
        assert!(!fs::staging_path(&dest).exists());

        let mut zip = zip::ZipArchive::new(std::fs::File::open(&dest).unwrap()).unwrap();
        let names: Vec<String> = zip.file_names().map(str::to_string).collect();
        assert!(names.iter().all(|n| n.starts_with("RuneKit.app")));

        let mut link = zip
            .by_name("RuneKit.app/Contents/Frameworks/QtCore.framework/Versions/Current")
            .unwrap();
        assert_eq!(link.unix_mode().unwrap() & 0o170000, 0o120000);
        let mut target = String::new();
        link.read_to_string(&mut target).unwrap();
        assert_eq!(target, "5");
    }

    #[tokio::test]
    async fn missing_bundle_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = archive_bundle(&dir.path().join("Nope.app"), &dir.path().join("x.zip"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::bundler::ErrorKind::Input);
    }
}
