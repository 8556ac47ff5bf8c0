//! Base runtime fetch: caching, pinning and recovery from half-done states.

#![cfg(unix)]

mod common;

use common::{CountingDownloader, Layout, Project, RUNTIME_IMAGE};
use kodegen_bundler_pipeline::bundler::{
    ErrorKind,
    platform::linux::{RuntimeMarker, RuntimeWorkspace, runtime},
};

fn linux_only() -> Project {
    Project::with_layout(Layout {
        macos: false,
        ..Layout::default()
    })
}

fn marker(project: &Project) -> RuntimeMarker {
    let text = std::fs::read_to_string(project.path("build/appdir.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn downloads_and_extracts_once() {
    let project = linux_only();
    let downloader = CountingDownloader::default();

    let workspace = runtime::ensure_runtime(&project.settings(), &downloader)
        .await
        .unwrap();
    assert_eq!(downloader.calls(), 1);
    assert_eq!(project.count("extract"), 1);
    assert_eq!(workspace.version().to_string(), "3.9.1");
    assert_eq!(workspace.root(), project.settings().runtime_dir().unwrap());
    assert!(workspace.python().is_file());
    assert!(project.path(&format!("build/{RUNTIME_IMAGE}")).is_file());
    assert!(!project.path("build/squashfs-root").exists());

    let recorded = marker(&project);
    assert_eq!(recorded.version, semver::Version::new(3, 9, 1));
    assert_eq!(recorded.sha256.len(), 64);

    let again = runtime::ensure_runtime(&project.settings(), &downloader)
        .await
        .unwrap();
    assert_eq!(downloader.calls(), 1);
    assert_eq!(project.count("extract"), 1);
    assert_eq!(again.root(), workspace.root());
}

#[tokio::test]
async fn cached_image_is_reextracted_without_download() {
    let project = linux_only();
    let downloader = CountingDownloader::default();
    runtime::ensure_runtime(&project.settings(), &downloader)
        .await
        .unwrap();

    std::fs::remove_dir_all(project.path("build/appdir")).unwrap();
    runtime::ensure_runtime(&project.settings(), &downloader)
        .await
        .unwrap();

    assert_eq!(downloader.calls(), 1);
    assert_eq!(project.count("extract"), 2);
    assert!(project.path("build/appdir/AppRun").exists());
}

#[tokio::test]
async fn unmarked_directory_is_discarded() {
    let project = linux_only();
    common::write(&project.path("build/appdir/leftover.txt"), "half extracted");

    runtime::ensure_runtime(&project.settings(), &CountingDownloader::default())
        .await
        .unwrap();

    assert!(!project.path("build/appdir/leftover.txt").exists());
    assert!(project.path("build/appdir.json").is_file());
}

#[tokio::test]
async fn changed_pin_requires_explicit_clean() {
    let project = linux_only();
    runtime::ensure_runtime(&project.settings(), &CountingDownloader::default())
        .await
        .unwrap();

    project.edit_config(|text| text.replace("version = \"3.9.1\"", "version = \"3.9.2\""));
    let downloader = CountingDownloader::default();
    let err = runtime::ensure_runtime(&project.settings(), &downloader)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(err.to_string().contains("3.9.1"));
    assert!(err.to_string().contains("clean --runtime"));
    assert_eq!(downloader.calls(), 0);
    assert!(project.path("build/appdir/AppRun").exists());

    let err = RuntimeWorkspace::acquire(&project.settings()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);

    runtime::clean(&project.settings()).await.unwrap();
    runtime::ensure_runtime(&project.settings(), &downloader)
        .await
        .unwrap();
    assert_eq!(downloader.calls(), 1);
    assert_eq!(marker(&project).version, semver::Version::new(3, 9, 2));
}

#[tokio::test]
async fn checksum_mismatch_drops_the_image() {
    let project = linux_only();
    project.edit_config(|text| {
        text.replace(
            "python = \"opt/python3.9/bin/python3.9\"",
            &format!("python = \"opt/python3.9/bin/python3.9\"\nsha256 = \"{}\"", "0".repeat(64)),
        )
    });

    let err = runtime::ensure_runtime(&project.settings(), &CountingDownloader::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.to_string().contains("SHA-256 mismatch"));
    assert!(!project.path(&format!("build/{RUNTIME_IMAGE}")).exists());
    assert!(!project.path("build/appdir.json").exists());
    assert_eq!(project.count("extract"), 0);
}

#[tokio::test]
async fn failed_download_leaves_nothing_behind() {
    let project = linux_only();
    std::fs::remove_file(project.path(&format!("tools/{RUNTIME_IMAGE}"))).unwrap();

    let err = runtime::ensure_runtime(&project.settings(), &CountingDownloader::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(!project.path(&format!("build/{RUNTIME_IMAGE}")).exists());
    assert!(!project.path("build/appdir").exists());
    assert!(!project.path("build/appdir.json").exists());
}

#[tokio::test]
async fn acquire_requires_a_fetched_runtime() {
    let project = linux_only();
    let err = RuntimeWorkspace::acquire(&project.settings()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);

    runtime::ensure_runtime(&project.settings(), &CountingDownloader::default())
        .await
        .unwrap();
    let workspace = RuntimeWorkspace::acquire(&project.settings()).await.unwrap();

    workspace.discard().await.unwrap();
    assert!(!project.path("build/appdir.json").exists());
    assert!(RuntimeWorkspace::acquire(&project.settings()).await.is_err());
}
