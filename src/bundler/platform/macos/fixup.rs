//! Code-signing layout fixup.
//!
//! `codesign --deep` rejects bundles whose frameworks live outside
//! `Contents/Frameworks`, exist twice, or are reached through chains of
//! links. [`fixup`] scans the bundle, moves every framework to its canonical
//! slot, replaces former locations with relative links, thins universal
//! binaries carrying extra slices, and re-scans. Whatever is left is reported
//! as [`Error::StructuralViolation`].

use super::{AppBundle, macho};
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    settings::MachArch,
    utils::fs,
};
use std::{
    collections::BTreeMap,
    fmt,
    path::{Component, Path, PathBuf},
};
use walkdir::WalkDir;

const FRAMEWORK_SUFFIX: &str = ".framework";

/// A layout problem found in an application bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Real framework directory outside `Contents/Frameworks`.
    NestedFramework {
        /// Framework directory
        path: PathBuf,
    },
    /// One of several real copies of the same framework.
    DuplicateFramework {
        /// Framework directory
        path: PathBuf,
        /// Total number of real copies
        copies: usize,
    },
    /// Link to a framework that does not point straight at the canonical copy.
    IndirectFrameworkLink {
        /// The link
        path: PathBuf,
        /// Its raw target
        target: PathBuf,
    },
    /// Link that dangles or resolves outside the bundle.
    EscapingLink {
        /// The link
        path: PathBuf,
        /// Its raw target
        target: PathBuf,
    },
    /// Mach-O file whose slices differ from the expected set.
    ArchitectureMismatch {
        /// The binary
        path: PathBuf,
        /// Slices it carries
        found: Vec<MachArch>,
        /// Slices it should carry
        expected: Vec<MachArch>,
        /// Universal container, so extra slices can be dropped
        fat: bool,
    },
}

impl Violation {
    /// Offending path.
    pub fn path(&self) -> &Path {
        match self {
            Violation::NestedFramework { path }
            | Violation::DuplicateFramework { path, .. }
            | Violation::IndirectFrameworkLink { path, .. }
            | Violation::EscapingLink { path, .. }
            | Violation::ArchitectureMismatch { path, .. } => path,
        }
    }

    /// Whether [`fixup`] knows how to repair this violation.
    pub fn is_resolvable(&self) -> bool {
        match self {
            Violation::NestedFramework { .. }
            | Violation::DuplicateFramework { .. }
            | Violation::IndirectFrameworkLink { .. } => true,
            Violation::EscapingLink { .. } => false,
            Violation::ArchitectureMismatch {
                found,
                expected,
                fat,
                ..
            } => *fat && expected.iter().all(|a| found.contains(a)),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NestedFramework { path } => {
                write!(f, "{}: framework outside Contents/Frameworks", path.display())
            }
            Violation::DuplicateFramework { path, copies } => {
                write!(f, "{}: one of {} copies of this framework", path.display(), copies)
            }
            Violation::IndirectFrameworkLink { path, target } => write!(
                f,
                "{}: link to {} does not point at the canonical framework",
                path.display(),
                target.display()
            ),
            Violation::EscapingLink { path, target } => write!(
                f,
                "{}: link to {} dangles or leaves the bundle",
                path.display(),
                target.display()
            ),
            Violation::ArchitectureMismatch {
                path,
                found,
                expected,
                ..
            } => write!(
                f,
                "{}: carries [{}], expected [{}]",
                path.display(),
                join(found),
                join(expected)
            ),
        }
    }
}

fn join(arches: &[MachArch]) -> String {
    arches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A framework moved into its canonical slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkMove {
    /// Former location (now a link)
    pub from: PathBuf,
    /// Canonical location
    pub to: PathBuf,
}

/// Everything [`fixup`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixupReport {
    /// Frameworks moved into `Contents/Frameworks`
    pub moves: Vec<FrameworkMove>,
    /// Duplicate copies deleted
    pub removed: Vec<PathBuf>,
    /// Links (re)written to point at a canonical framework
    pub relinked: Vec<PathBuf>,
    /// Binaries reduced to the expected slices
    pub thinned: Vec<PathBuf>,
}

impl FixupReport {
    /// True when the bundle was already compliant.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
            && self.removed.is_empty()
            && self.relinked.is_empty()
            && self.thinned.is_empty()
    }
}

/// Lists the layout violations of `bundle`, in sorted path order.
pub async fn scan(bundle: &AppBundle) -> Result<Vec<Violation>> {
    let bundle = bundle.clone();
    tokio::task::spawn_blocking(move || scan_blocking(&bundle)).await?
}

fn scan_blocking(bundle: &AppBundle) -> Result<Vec<Violation>> {
    let root = bundle.root();
    let canonical_root = root
        .canonicalize()
        .fs_context("resolving application bundle", root)?;
    let expected = expected_slices(bundle)?;

    let mut violations = Vec::new();
    let mut frameworks: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut binaries = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            if let Some(v) = check_link(bundle, &canonical_root, path)? {
                violations.push(v);
            }
        } else if file_type.is_dir() {
            if let Some(name) = framework_name(path) {
                if !inside_framework(root, path) {
                    frameworks.entry(name).or_default().push(path.to_path_buf());
                }
            }
        } else if file_type.is_file() && expected.is_some() {
            binaries.push(path.to_path_buf());
        }
    }

    for (name, copies) in &frameworks {
        let slot = bundle.canonical_framework(name);
        for path in copies.iter().filter(|p| **p != slot) {
            violations.push(if copies.len() > 1 {
                Violation::DuplicateFramework {
                    path: path.clone(),
                    copies: copies.len(),
                }
            } else {
                Violation::NestedFramework { path: path.clone() }
            });
        }
    }

    if let Some(expected) = expected {
        for path in binaries {
            let Some(found) = macho::read_slices(&path)? else {
                continue;
            };
            if found.arches != expected {
                violations.push(Violation::ArchitectureMismatch {
                    path,
                    found: found.arches,
                    expected: expected.clone(),
                    fat: found.fat,
                });
            }
        }
    }

    violations.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(violations)
}

/// Slices every binary must carry: the configured architecture, else those
/// of the main executable. `None` when neither is known.
fn expected_slices(bundle: &AppBundle) -> Result<Option<Vec<MachArch>>> {
    if let Some(arch) = bundle.target_arch() {
        return Ok(Some(arch.slices()));
    }
    let main = bundle.main_executable();
    if !main.is_file() {
        return Ok(None);
    }
    Ok(macho::read_slices(&main)?.map(|s| s.arches))
}

fn check_link(bundle: &AppBundle, canonical_root: &Path, link: &Path) -> Result<Option<Violation>> {
    let target = std::fs::read_link(link).fs_context("reading link", link)?;
    let parent = link.parent().unwrap_or(bundle.root());

    let resolved = match parent.join(&target).canonicalize() {
        Ok(resolved) if resolved.starts_with(canonical_root) => resolved,
        _ => {
            return Ok(Some(Violation::EscapingLink {
                path: link.to_path_buf(),
                target,
            }));
        }
    };

    let Some(name) = framework_name(&resolved).or_else(|| framework_name(link)) else {
        return Ok(None);
    };
    if inside_framework(canonical_root, &resolved) {
        return Ok(None);
    }

    let slot = bundle.canonical_framework(&name);
    let direct = target.is_relative()
        && link != slot
        && normalize(&parent.join(&target)) == slot
        && is_real_dir(&slot);
    if direct {
        Ok(None)
    } else {
        Ok(Some(Violation::IndirectFrameworkLink {
            path: link.to_path_buf(),
            target,
        }))
    }
}

/// `QtCore.framework` for `.../QtCore.framework`.
fn framework_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    name.ends_with(FRAMEWORK_SUFFIX).then(|| name.into_owned())
}

/// Whether `path` lies inside (not at) another framework below `root`.
fn inside_framework(root: &Path, path: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return false;
    };
    let mut components: Vec<_> = rel.components().collect();
    components.pop();
    components
        .iter()
        .any(|c| c.as_os_str().to_string_lossy().ends_with(FRAMEWORK_SUFFIX))
}

fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|m| m.is_dir())
}

/// Lexically resolves `.` and `..` without touching the file system.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Repairs `bundle` in place and verifies the result.
///
/// Processing is deterministic (sorted paths) and idempotent: a compliant
/// bundle yields an empty report and is left untouched.
///
/// # Errors
///
/// [`Error::StructuralViolation`] listing every path still in violation.
pub async fn fixup(bundle: &AppBundle) -> Result<FixupReport> {
    let mut report = FixupReport::default();

    let found = scan(bundle).await?;
    if found.is_empty() {
        log::debug!("{} already satisfies the signing layout", bundle.root().display());
        return Ok(report);
    }
    log::info!(
        "Fixing {} layout violation(s) in {}",
        found.len(),
        bundle.root().display()
    );

    for violation in &found {
        if let Violation::ArchitectureMismatch { path, expected, .. } = violation {
            if violation.is_resolvable() {
                log::debug!("Thinning {} to [{}]", path.display(), join(expected));
                macho::thin(path, expected).await?;
                report.thinned.push(path.clone());
            }
        }
    }

    let mut frameworks: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for violation in &found {
        if let Violation::NestedFramework { path } | Violation::DuplicateFramework { path, .. } =
            violation
        {
            if let Some(name) = framework_name(path) {
                frameworks.entry(name).or_default().push(path.clone());
            }
        }
    }
    for (name, mut copies) in frameworks {
        copies.sort();
        let slot = bundle.canonical_framework(&name);
        for path in copies {
            if is_real_dir(&slot) {
                log::debug!("Removing duplicate {}", path.display());
                fs::remove_dir_all(&path).await?;
                report.removed.push(path.clone());
            } else {
                log::debug!("Moving {} to {}", path.display(), slot.display());
                fs::remove_any(&slot).await?;
                fs::create_dir_all(&bundle.frameworks_dir(), false).await?;
                tokio::fs::rename(&path, &slot)
                    .await
                    .fs_context("moving framework", &path)?;
                report.moves.push(FrameworkMove {
                    from: path.clone(),
                    to: slot.clone(),
                });
            }
            fs::symlink_relative(&slot, &path).await?;
            report.relinked.push(path);
        }
    }

    // Moves can turn existing links into links to links; rewrite them last.
    for violation in scan(bundle).await? {
        if let Violation::IndirectFrameworkLink { path, .. } = &violation {
            let Some(slot) = link_slot(bundle, path) else {
                continue;
            };
            log::debug!("Relinking {} to {}", path.display(), slot.display());
            fs::remove_file(path).await?;
            fs::symlink_relative(&slot, path).await?;
            report.relinked.push(path.clone());
        }
    }

    let remaining = scan(bundle).await?;
    if !remaining.is_empty() {
        return Err(Error::StructuralViolation {
            bundle: bundle.root().to_path_buf(),
            unresolved: remaining.iter().map(ToString::to_string).collect(),
        });
    }

    log::info!(
        "✓ Fixed bundle layout ({} moved, {} removed, {} relinked, {} thinned)",
        report.moves.len(),
        report.removed.len(),
        report.relinked.len(),
        report.thinned.len()
    );
    Ok(report)
}

/// Canonical framework a link should point at, if that copy exists.
fn link_slot(bundle: &AppBundle, link: &Path) -> Option<PathBuf> {
    let name = std::fs::canonicalize(link)
        .ok()
        .and_then(|resolved| framework_name(&resolved))
        .or_else(|| framework_name(link))?;
    let slot = bundle.canonical_framework(&name);
    (slot != link && is_real_dir(&slot)).then_some(slot)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn framework(at: &Path) {
        std::fs::create_dir_all(at.join("Versions/5")).unwrap();
        std::fs::write(at.join("Versions/5/QtCore"), b"core").unwrap();
        symlink("5", at.join("Versions/Current")).unwrap();
        symlink("Versions/Current/QtCore", at.join("QtCore")).unwrap();
    }

    fn bundle() -> (tempfile::TempDir, AppBundle) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("RuneKit.app");
        std::fs::create_dir_all(root.join("Contents/MacOS")).unwrap();
        std::fs::write(root.join("Contents/MacOS/RuneKit"), b"#!/bin/sh\n").unwrap();
        (dir, AppBundle::new(root, "RuneKit"))
    }

    #[tokio::test]
    async fn compliant_bundle_has_no_violations() {
        let (_dir, app) = bundle();
        framework(&app.canonical_framework("QtCore.framework"));
        symlink(
            "../Frameworks/QtCore.framework",
            app.root().join("Contents/MacOS/QtCore.framework"),
        )
        .unwrap();
        assert!(scan(&app).await.unwrap().is_empty());
        assert!(fixup(&app).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn nested_framework_is_moved_and_linked() {
        let (_dir, app) = bundle();
        let nested = app.root().join("Contents/MacOS/PySide2/Qt/lib/QtCore.framework");
        framework(&nested);

        let found = scan(&app).await.unwrap();
        assert_eq!(found, vec![Violation::NestedFramework { path: nested.clone() }]);

        let report = fixup(&app).await.unwrap();
        let slot = app.canonical_framework("QtCore.framework");
        assert_eq!(
            report.moves,
            vec![FrameworkMove {
                from: nested.clone(),
                to: slot.clone()
            }]
        );
        assert!(is_real_dir(&slot));
        assert_eq!(
            std::fs::read_link(&nested).unwrap(),
            PathBuf::from("../../../../Frameworks/QtCore.framework")
        );
    }

    #[tokio::test]
    async fn absolute_and_chained_links_are_rewritten() {
        let (_dir, app) = bundle();
        let slot = app.canonical_framework("QtGui.framework");
        framework(&slot);
        let resources = app.root().join("Contents/Resources");
        std::fs::create_dir_all(&resources).unwrap();
        symlink(&slot, resources.join("QtGui.framework")).unwrap();
        symlink("QtGui.framework", resources.join("Gui.framework")).unwrap();

        let found = scan(&app).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(Violation::is_resolvable));

        let report = fixup(&app).await.unwrap();
        assert_eq!(report.relinked.len(), 2);
        assert!(scan(&app).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn escaping_link_is_fatal() {
        let (dir, app) = bundle();
        let outside = dir.path().join("libssl.dylib");
        std::fs::write(&outside, b"ssl").unwrap();
        symlink(&outside, app.root().join("Contents/MacOS/libssl.dylib")).unwrap();

        let err = fixup(&app).await.unwrap_err();
        assert_eq!(err.kind(), crate::bundler::ErrorKind::StructuralViolation);
        assert!(err.to_string().contains("libssl.dylib"));
    }

    #[test]
    fn normalizes_parent_components() {
        assert_eq!(
            normalize(Path::new("/a/App.app/Contents/MacOS/../Frameworks/X.framework")),
            PathBuf::from("/a/App.app/Contents/Frameworks/X.framework")
        );
    }
}
