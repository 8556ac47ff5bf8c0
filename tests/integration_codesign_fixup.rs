//! Signing layout repair on a bundle with duplicated frameworks.

#![cfg(unix)]

mod common;

use common::{CountingDownloader, Project};
use kodegen_bundler_pipeline::bundler::{
    ErrorKind, Pipeline, TargetId,
    platform::macos::{
        AppBundle,
        fixup::{self, Violation},
        sign,
    },
    settings::SigningSettings,
};
use std::{
    collections::BTreeMap,
    io::Read,
    os::unix::fs::{PermissionsExt, symlink},
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

const NESTED: &str = "Contents/MacOS/PySide2/Qt/lib/QtCore.framework";
const DUPLICATE: &str = "Contents/Resources/PySide2/Qt/lib/QtCore.framework";

fn framework(at: &Path) {
    std::fs::create_dir_all(at.join("Versions/5")).unwrap();
    std::fs::write(at.join("Versions/5/QtCore"), b"core").unwrap();
    symlink("5", at.join("Versions/Current")).unwrap();
    symlink("Versions/Current/QtCore", at.join("QtCore")).unwrap();
}

fn duplicated_bundle(dir: &Path) -> AppBundle {
    let root = dir.join("RuneKit.app");
    std::fs::create_dir_all(root.join("Contents/MacOS")).unwrap();
    std::fs::write(root.join("Contents/MacOS/RuneKit"), b"#!/bin/sh\n").unwrap();
    framework(&root.join(NESTED));
    framework(&root.join(DUPLICATE));
    AppBundle::new(root, "RuneKit")
}

/// PyInstaller's own layout: one real copy deep under `MacOS`, reached from
/// `Frameworks` and `Resources` through links.
fn linked_bundle(dir: &Path) -> AppBundle {
    let root = dir.join("RuneKit.app");
    std::fs::create_dir_all(root.join("Contents/MacOS")).unwrap();
    std::fs::write(root.join("Contents/MacOS/RuneKit"), b"#!/bin/sh\n").unwrap();
    framework(&root.join(NESTED));

    std::fs::create_dir_all(root.join("Contents/Frameworks")).unwrap();
    symlink(
        "../MacOS/PySide2/Qt/lib/QtCore.framework",
        root.join("Contents/Frameworks/QtCore.framework"),
    )
    .unwrap();
    std::fs::create_dir_all(root.join("Contents/Resources/PySide2/Qt/lib")).unwrap();
    symlink(
        "../../../../MacOS/PySide2/Qt/lib/QtCore.framework",
        root.join(DUPLICATE),
    )
    .unwrap();
    AppBundle::new(root, "RuneKit")
}

fn signer(dir: &Path) -> (SigningSettings, PathBuf) {
    let log = dir.join("codesign.log");
    let tool = dir.join("codesign");
    std::fs::write(
        &tool,
        format!("#!/bin/sh\necho \"$@\" >> '{}'\n", log.display()),
    )
    .unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
    let settings = SigningSettings {
        command: vec![tool.display().to_string()],
        ..SigningSettings::default()
    };
    (settings, log)
}

/// Every entry below `root`: file bytes, link targets, or a directory marker.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, String> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let rel = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let value = if entry.path_is_symlink() {
                format!("-> {}", std::fs::read_link(entry.path()).unwrap().display())
            } else if entry.file_type().is_dir() {
                "dir".to_string()
            } else {
                String::from_utf8_lossy(&std::fs::read(entry.path()).unwrap()).into_owned()
            };
            (rel, value)
        })
        .collect()
}

#[tokio::test]
async fn signing_refuses_duplicated_frameworks() {
    let dir = tempfile::tempdir().unwrap();
    let app = duplicated_bundle(dir.path());
    let (signing, log) = signer(dir.path());

    let violations = fixup::scan(&app).await.unwrap();
    assert_eq!(violations.len(), 2);
    assert!(violations.iter().all(Violation::is_resolvable));

    let err = sign::sign(&app, &signing).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StructuralViolation);
    assert!(err.to_string().contains("QtCore.framework"));
    assert!(!log.exists(), "signer must not run on a broken layout");
}

#[tokio::test]
async fn fixup_then_sign_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let app = duplicated_bundle(dir.path());
    let (signing, log) = signer(dir.path());

    let report = fixup::fixup(&app).await.unwrap();
    let slot = app.canonical_framework("QtCore.framework");
    assert_eq!(report.moves.len(), 1);
    assert_eq!(report.removed.len(), 1);
    assert_eq!(report.relinked.len(), 2);
    assert!(report.thinned.is_empty());

    // One real copy in the canonical slot, relative links everywhere else.
    assert!(!std::fs::symlink_metadata(&slot).unwrap().file_type().is_symlink());
    for former in [NESTED, DUPLICATE] {
        let link = app.root().join(former);
        let target = std::fs::read_link(&link).unwrap();
        assert!(target.is_relative(), "{} -> {}", link.display(), target.display());
        assert_eq!(
            std::fs::canonicalize(&link).unwrap(),
            std::fs::canonicalize(&slot).unwrap()
        );
    }
    assert!(fixup::scan(&app).await.unwrap().is_empty());

    sign::sign(&app, &signing).await.unwrap();
    let args = std::fs::read_to_string(&log).unwrap();
    assert!(args.contains("-s - --force --all-architectures --timestamp --deep"));
    assert!(args.trim_end().ends_with(&app.root().display().to_string()));
}

#[tokio::test]
async fn fixup_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let app = duplicated_bundle(dir.path());

    assert!(!fixup::fixup(&app).await.unwrap().is_empty());
    let before = snapshot(app.root());

    let second = fixup::fixup(&app).await.unwrap();
    assert!(second.is_empty(), "{second:?}");
    assert_eq!(snapshot(app.root()), before);
}

#[tokio::test]
async fn pipeline_ships_a_signed_bundle_with_links_preserved() {
    let project = Project::new();
    let mut pipeline =
        Pipeline::with_downloader(project.settings(), CountingDownloader::default());
    pipeline.build(&[TargetId::AppArchive]).await.unwrap();

    // Signed before promotion, never in place under dist/.
    let signed: Vec<String> = project
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("codesign"))
        .collect();
    assert_eq!(signed.len(), 1);
    assert!(signed[0].ends_with("build/pyinstaller/dist/RuneKit.app"));

    let app = project.path("dist/RuneKit.app");
    assert!(app.join("Contents/Frameworks/QtCore.framework").is_dir());
    assert!(
        std::fs::symlink_metadata(app.join(NESTED))
            .unwrap()
            .file_type()
            .is_symlink()
    );

    let archive = std::fs::File::open(project.path("dist/RuneKit.app.zip")).unwrap();
    let mut zip = zip::ZipArchive::new(archive).unwrap();
    let mut entry = zip.by_name(&format!("RuneKit.app/{NESTED}")).unwrap();
    assert_eq!(entry.unix_mode().unwrap() & 0o170000, 0o120000);
    let mut target = String::new();
    entry.read_to_string(&mut target).unwrap();
    assert_eq!(target, "../../../../Frameworks/QtCore.framework");
}

#[tokio::test]
async fn escaping_link_fails_the_app_target() {
    let project = Project::new();
    // The fake bundler now also links a library from outside the bundle.
    let script = std::fs::read_to_string(project.path("tools/pyinstaller")).unwrap();
    let outside = project.path("libssl.dylib");
    std::fs::write(&outside, b"ssl").unwrap();
    std::fs::write(
        project.path("tools/pyinstaller"),
        format!(
            "{script}ln -s '{}' \"$app/MacOS/libssl.dylib\"\n",
            outside.display()
        ),
    )
    .unwrap();

    let err = Pipeline::with_downloader(project.settings(), CountingDownloader::default())
        .build(&[TargetId::AppBundle])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StructuralViolation);
    assert!(err.to_string().contains("libssl.dylib"));
    assert!(!project.path("dist/RuneKit.app").exists());
    assert_eq!(project.count("codesign"), 0);
}

#[tokio::test]
async fn linked_copies_are_collapsed_before_signing() {
    let dir = tempfile::tempdir().unwrap();
    let app = linked_bundle(dir.path());
    let (signing, log) = signer(dir.path());
    let slot = app.canonical_framework("QtCore.framework");

    let violations = fixup::scan(&app).await.unwrap();
    assert_eq!(violations.len(), 3, "{violations:?}");
    assert!(violations.iter().all(Violation::is_resolvable));
    let err = sign::sign(&app, &signing).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StructuralViolation);
    assert!(!log.exists());

    let report = fixup::fixup(&app).await.unwrap();
    assert_eq!(report.moves.len(), 1);
    assert_eq!(report.moves[0].from, app.root().join(NESTED));
    assert_eq!(report.moves[0].to, slot);
    assert!(report.removed.is_empty());
    assert_eq!(report.relinked.len(), 2);

    assert!(!std::fs::symlink_metadata(&slot).unwrap().file_type().is_symlink());
    assert_eq!(std::fs::read(slot.join("Versions/5/QtCore")).unwrap(), b"core");
    for former in [NESTED, DUPLICATE] {
        let link = app.root().join(former);
        assert!(std::fs::read_link(&link).unwrap().is_relative());
        assert_eq!(
            std::fs::canonicalize(&link).unwrap(),
            std::fs::canonicalize(&slot).unwrap()
        );
    }

    sign::sign(&app, &signing).await.unwrap();
    assert!(log.exists());

    let before = snapshot(app.root());
    assert!(fixup::fixup(&app).await.unwrap().is_empty());
    assert_eq!(snapshot(app.root()), before);
}
