//! macOS application bundle assembly.
//!
//! Renders the bundler spec from `[macos]`, runs the bundler with a private
//! dist/work directory under the build dir, repairs the signing layout and
//! signs the result there, and only then promotes `<App>.app` into the dist
//! directory. A failure at any step leaves no bundle in dist.

use super::{AppBundle, fixup, sign};
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    graph::Input,
    settings::{MacOsSettings, Settings},
    utils::{fs, process::ToolCommand},
};
use handlebars::Handlebars;
use serde_json::json;
use std::path::{Path, PathBuf};

const SPEC_TEMPLATE: &str = r#"# -*- mode: python ; coding: utf-8 -*-
# Generated from {{config}}; local edits are overwritten on the next build.

block_cipher = None

a = Analysis(
    [{{entry_script}}],
    pathex=[{{root}}],
    binaries=[],
    datas={{datas}},
    hiddenimports=[],
    hookspath=[],
    runtime_hooks=[],
    excludes={{excludes}},
    win_no_prefer_redirects=False,
    win_private_assemblies=False,
    cipher=block_cipher,
    noarchive=False,
)
pyz = PYZ(a.pure, a.zipped_data, cipher=block_cipher)
exe = EXE(
    pyz,
    a.scripts,
    [],
    exclude_binaries=True,
    name={{name}},
    debug={{debug}},
    bootloader_ignore_signals=False,
    strip={{strip}},
    upx={{upx}},
    console={{console}},
    target_arch={{target_arch}},
    codesign_identity={{codesign_identity}},
    entitlements_file=None,
)
coll = COLLECT(
    exe,
    a.binaries,
    a.zipfiles,
    a.datas,
    strip={{strip}},
    upx={{upx}},
    upx_exclude=[],
    name={{name}},
)
app = BUNDLE(
    coll,
    name={{bundle_name}},
    icon={{icon}},
    bundle_identifier={{bundle_identifier}},
)
"#;

/// Declared inputs of the app target (the pipeline file is added by the
/// orchestrator).
pub fn inputs(settings: &Settings, macos: &MacOsSettings) -> Vec<Input> {
    let mut inputs = vec![
        Input::file(settings.resolve(&macos.entry_script)),
        Input::file(settings.resolve(&settings.resources().output)),
    ];
    if let Some(icon) = &macos.icon {
        inputs.push(Input::file(settings.resolve(icon)));
    }
    inputs.extend(
        macos
            .datas
            .iter()
            .map(|(source, _)| Input::file(settings.resolve(source))),
    );
    inputs.extend(
        settings
            .sources()
            .iter()
            .map(|pattern| Input::glob(settings.resolve_glob(pattern))),
    );
    inputs
}

/// Bundler spec path (`build/<App>.spec`).
pub fn spec_path(settings: &Settings) -> PathBuf {
    settings
        .build_dir()
        .join(format!("{}.spec", settings.product_name()))
}

/// Quotes a string as a Python literal.
fn py_str(value: impl AsRef<str>) -> String {
    serde_json::Value::String(value.as_ref().to_string()).to_string()
}

fn py_path(path: &Path) -> String {
    py_str(path.to_string_lossy())
}

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn py_optional(value: Option<String>) -> String {
    value.map(py_str).unwrap_or_else(|| "None".to_string())
}

/// Renders the bundler spec for `macos`.
pub fn render_spec(settings: &Settings, macos: &MacOsSettings) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .register_template_string("bundle.spec", SPEC_TEMPLATE)
        .map_err(|e| Error::GenericError(format!("failed to parse spec template: {e}")))?;

    let excludes = macos
        .effective_excludes()
        .iter()
        .map(py_str)
        .collect::<Vec<_>>()
        .join(", ");
    let datas = macos
        .datas
        .iter()
        .map(|(source, dest)| format!("({}, {})", py_path(&settings.resolve(source)), py_str(dest)))
        .collect::<Vec<_>>()
        .join(", ");

    let data = json!({
        "config": settings.config_file().display().to_string(),
        "entry_script": py_path(&settings.resolve(&macos.entry_script)),
        "root": py_path(settings.root()),
        "datas": format!("[{datas}]"),
        "excludes": format!("[{excludes}]"),
        "name": py_str(settings.product_name()),
        "bundle_name": py_str(format!("{}.app", settings.product_name())),
        "debug": py_bool(macos.debug),
        "strip": py_bool(macos.strip),
        "upx": py_bool(macos.upx),
        "console": py_bool(!macos.windowed),
        "target_arch": py_optional(macos.target_arch.map(|a| a.as_str().to_string())),
        "codesign_identity": py_optional(macos.codesign_identity.clone()),
        "icon": py_optional(
            macos
                .icon
                .as_ref()
                .map(|i| settings.resolve(i).to_string_lossy().into_owned())
        ),
        "bundle_identifier": py_str(&macos.bundle_identifier),
    });

    Ok(handlebars.render("bundle.spec", &data)?)
}

/// Assembles, repairs and signs the application bundle, then promotes it to
/// `dist/<App>.app`.
pub async fn build(settings: &Settings) -> Result<fixup::FixupReport> {
    let macos = settings
        .macos()
        .ok_or_else(|| Error::Config("the app target requires a [macos] table".to_string()))?;

    let entry = settings.resolve(&macos.entry_script);
    if !entry.is_file() {
        return Err(Error::MissingInput {
            path: entry,
            reason: "entry script not found".to_string(),
        });
    }

    let output = settings.app_bundle();
    fs::remove_dir_all(&output).await?;

    let build_dir = settings.build_dir();
    let distpath = build_dir.join("pyinstaller/dist");
    let workpath = build_dir.join("pyinstaller/work");
    let produced = distpath.join(format!("{}.app", settings.product_name()));
    fs::remove_dir_all(&produced).await?;
    fs::create_dir_all(&build_dir, false).await?;

    let spec = spec_path(settings);
    let rendered = render_spec(settings, macos)?;
    tokio::fs::write(&spec, rendered)
        .await
        .fs_context("writing bundler spec", &spec)?;
    log::debug!("Wrote bundler spec {}", spec.display());

    log::info!("Assembling {}.app", settings.product_name());
    ToolCommand::from_argv(&macos.bundler)?
        .arg("--noconfirm")
        .arg("--distpath")
        .arg(&distpath)
        .arg("--workpath")
        .arg(&workpath)
        .arg(&spec)
        .current_dir(settings.root())
        .run()
        .await?;

    if !produced.is_dir() {
        return Err(Error::GenericError(format!(
            "bundler exited successfully but did not produce {}",
            produced.display()
        )));
    }

    let bundle =
        AppBundle::new(&produced, settings.product_name()).with_target_arch(macos.target_arch);
    let report = fixup::fixup(&bundle).await?;
    if macos.signing.enabled {
        sign::sign(&bundle, &macos.signing).await?;
    } else {
        log::warn!("Signing disabled; {} ships unsigned", output.display());
    }

    fs::promote(&produced, &output).await?;
    log::info!("✓ Created {}", output.display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::SettingsBuilder;

    fn settings(macos: &str) -> (tempfile::TempDir, Settings) {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("packaging.toml");
        std::fs::write(
            &config,
            format!(
                r#"
[project]
name = "runekit"
app_name = "RuneKit"

[resources]
manifest = "resources.qrc"
output = "runekit/_resources.py"

[sdist]
lock_file = "poetry.lock"
tool_output = "dist/runekit-*.tar.gz"
artifact = "runekit.tar.gz"

{macos}
"#
            ),
        )
        .unwrap();
        let settings = SettingsBuilder::new().config_path(&config).build().unwrap();
        (dir, settings)
    }

    #[test]
    fn spec_always_excludes_tkinter() {
        let (_dir, settings) = settings(
            r#"
[macos]
entry_script = "main.py"
bundle_identifier = "com.runekit.RuneKit"
excludes = ["PySide2.QtQml"]
"#,
        );
        let spec = render_spec(&settings, settings.macos().unwrap()).unwrap();
        assert!(spec.contains(r#"excludes=["PySide2.QtQml", "tkinter"]"#));
        assert!(spec.contains("console=False"));
        assert!(spec.contains("target_arch=None"));
        assert!(spec.contains("codesign_identity=None"));
        assert!(spec.contains(r#"name="RuneKit.app""#));
        assert!(spec.contains(r#"bundle_identifier="com.runekit.RuneKit""#));
    }

    #[test]
    fn spec_carries_arch_and_toggles() {
        let (_dir, settings) = settings(
            r#"
[macos]
entry_script = "main.py"
bundle_identifier = "com.runekit.RuneKit"
target_arch = "universal2"
debug = true
upx = true
windowed = false
"#,
        );
        let spec = render_spec(&settings, settings.macos().unwrap()).unwrap();
        assert!(spec.contains(r#"target_arch="universal2""#));
        assert!(spec.contains("debug=True"));
        assert!(spec.contains("upx=True"));
        assert!(spec.contains("strip=False"));
        assert!(spec.contains("console=True"));
    }

    #[tokio::test]
    async fn missing_entry_script_is_an_input_error() {
        let (_dir, settings) = settings(
            r#"
[macos]
entry_script = "main.py"
bundle_identifier = "com.runekit.RuneKit"
"#,
        );
        let err = build(&settings).await.unwrap_err();
        assert_eq!(err.kind(), crate::bundler::ErrorKind::Input);
    }
}
