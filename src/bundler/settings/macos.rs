//! macOS platform-specific settings.

use super::MacArch;
use std::path::PathBuf;

/// Module that can never be bundled; always excluded from the app.
pub const UNSUPPORTED_GUI_TOOLKIT: &str = "tkinter";

/// macOS application bundle (.app) configuration.
///
/// Rendered into the bundler's spec file by the assembly stage.
///
/// # Configuration
///
/// ```toml
/// [macos]
/// entry_script = "main.py"
/// bundle_identifier = "com.example.runekit"
/// excludes = ["tkinter"]
/// windowed = true
///
/// [macos.signing]
/// identity = "-"
/// ```
///
/// # See Also
///
/// - [`SigningSettings`] - post-assembly fixup and signature
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacOsSettings {
    /// Entry script of the application.
    pub entry_script: PathBuf,

    /// Bundle identifier (CFBundleIdentifier).
    pub bundle_identifier: String,

    /// Modules excluded from analysis.
    ///
    /// [`UNSUPPORTED_GUI_TOOLKIT`] is added when missing.
    #[serde(default)]
    pub excludes: Vec<String>,

    /// Extra data files: `(source, destination-in-bundle)` pairs.
    #[serde(default)]
    pub datas: Vec<(PathBuf, String)>,

    /// Bundle icon (`.icns`).
    ///
    /// Default: None
    #[serde(default)]
    pub icon: Option<PathBuf>,

    /// Build the bootloader with debug output.
    #[serde(default)]
    pub debug: bool,

    /// Strip symbols from binaries.
    #[serde(default)]
    pub strip: bool,

    /// Compress binaries with UPX.
    #[serde(default)]
    pub upx: bool,

    /// Windowed (`true`) or console (`false`) application.
    ///
    /// Default: true
    #[serde(default = "default_true")]
    pub windowed: bool,

    /// Identity handed to the bundler itself.
    ///
    /// Default: None (signing deferred to the codesign fixup stage)
    #[serde(default)]
    pub codesign_identity: Option<String>,

    /// Target architecture.
    ///
    /// Default: None (host-native)
    #[serde(default)]
    pub target_arch: Option<MacArch>,

    /// Bundler argv; bundler flags and the rendered spec path are appended.
    ///
    /// Default: `["pyinstaller"]`
    #[serde(default = "default_bundler")]
    pub bundler: Vec<String>,

    /// Fixup and signature applied after assembly.
    #[serde(default)]
    pub signing: SigningSettings,
}

impl MacOsSettings {
    /// Excluded modules, always containing [`UNSUPPORTED_GUI_TOOLKIT`].
    pub fn effective_excludes(&self) -> Vec<String> {
        let mut excludes = self.excludes.clone();
        if !excludes.iter().any(|m| m == UNSUPPORTED_GUI_TOOLKIT) {
            excludes.push(UNSUPPORTED_GUI_TOOLKIT.to_string());
        }
        excludes
    }
}

/// Code signature applied to the assembled bundle.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningSettings {
    /// Sign the bundle after the layout fixup.
    ///
    /// When false the archive stage ships the bundle unsigned.
    ///
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Signing identity; `-` is an ad-hoc signature.
    ///
    /// Default: `-`
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Signer argv; signature flags and the bundle path are appended.
    ///
    /// Default: `["codesign"]`
    #[serde(default = "default_codesign")]
    pub command: Vec<String>,
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            identity: default_identity(),
            command: default_codesign(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_identity() -> String {
    "-".to_string()
}

fn default_codesign() -> Vec<String> {
    vec!["codesign".to_string()]
}

fn default_bundler() -> Vec<String> {
    vec!["pyinstaller".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(excludes: &[&str]) -> MacOsSettings {
        let toml = format!(
            "entry_script = \"main.py\"\nbundle_identifier = \"com.example.app\"\nexcludes = {:?}\n",
            excludes
        );
        toml::from_str(&toml).unwrap()
    }

    #[test]
    fn toolkit_is_always_excluded() {
        assert_eq!(settings(&["numpy"]).effective_excludes(), vec!["numpy", "tkinter"]);
        assert_eq!(settings(&["tkinter"]).effective_excludes(), vec!["tkinter"]);
    }

    #[test]
    fn signing_defaults_to_ad_hoc() {
        let s = settings(&[]);
        assert!(s.signing.enabled);
        assert_eq!(s.signing.identity, "-");
        assert!(s.windowed);
        assert!(s.target_arch.is_none());
    }
}
