//! Resource compiler and source distribution settings.

use std::path::PathBuf;

/// Resource compiler configuration (`[resources]`).
///
/// ```toml
/// [resources]
/// manifest = "resources.qrc"
/// assets = ["runekit/**/*.js", "runekit/**/*.png"]
/// output = "runekit/_resources.py"
/// ```
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSettings {
    /// Resource manifest (`.qrc`).
    pub manifest: PathBuf,

    /// Additional asset globs watched besides the files named in the manifest.
    #[serde(default)]
    pub assets: Vec<String>,

    /// Generated module path.
    pub output: PathBuf,

    /// Compiler argv; the manifest, `-o` and the output path are appended.
    ///
    /// Default: `["pyside2-rcc"]`
    #[serde(default = "default_compiler")]
    pub compiler: Vec<String>,
}

fn default_compiler() -> Vec<String> {
    vec!["pyside2-rcc".to_string()]
}

/// Source distribution configuration (`[sdist]`).
///
/// ```toml
/// [sdist]
/// lock_file = "poetry.lock"
/// tool_output = "dist/runekit-*.tar.gz"
/// artifact = "runekit.tar.gz"
/// ```
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SdistSettings {
    /// Package manager argv that writes a source archive.
    ///
    /// Default: `["poetry", "build", "-f", "sdist"]`
    #[serde(default = "default_sdist_command")]
    pub command: Vec<String>,

    /// Dependency lock file.
    pub lock_file: PathBuf,

    /// Glob matching the tool's version-named output; the newest match wins.
    pub tool_output: String,

    /// Canonical file name inside the dist directory.
    pub artifact: String,
}

fn default_sdist_command() -> Vec<String> {
    ["poetry", "build", "-f", "sdist"]
        .into_iter()
        .map(String::from)
        .collect()
}
