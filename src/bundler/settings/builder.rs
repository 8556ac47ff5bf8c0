//! Builder for constructing Settings.

use super::{Settings, core::PipelineFile};
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    graph::StalenessPolicy,
};
use std::path::{Path, PathBuf};

/// Default pipeline file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "packaging.toml";

/// Builder for constructing [`Settings`].
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_pipeline::bundler::{SettingsBuilder, StalenessPolicy};
///
/// # fn example() -> kodegen_bundler_pipeline::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .config_path("packaging.toml")
///     .staleness(StalenessPolicy::ContentHash)
///     .appimagetool("/opt/appimagetool")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SettingsBuilder {
    config_path: Option<PathBuf>,
    staleness: Option<StalenessPolicy>,
    appimagetool: Option<String>,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the pipeline file.
    ///
    /// Default: `packaging.toml` in the working directory
    pub fn config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Overrides the staleness policy of the pipeline file.
    pub fn staleness(mut self, policy: StalenessPolicy) -> Self {
        self.staleness = Some(policy);
        self
    }

    /// Overrides the image builder program.
    pub fn appimagetool<S: Into<String>>(mut self, tool: S) -> Self {
        self.appimagetool = Some(tool.into());
        self
    }

    /// Reads, parses and validates the pipeline file.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingInput`] when the file does not exist
    /// - [`Error::Toml`] when it does not parse
    /// - [`Error::Config`] when a value is unusable
    pub fn build(self) -> Result<Settings> {
        let config_path = self
            .config_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if !config_path.is_file() {
            return Err(Error::MissingInput {
                path: config_path,
                reason: "pipeline file not found".to_string(),
            });
        }

        let text = std::fs::read_to_string(&config_path)
            .fs_context("reading pipeline file", &config_path)?;
        let mut file: PipelineFile = toml::from_str(&text)?;
        validate(&file)?;

        let config_path = std::path::absolute(&config_path)
            .fs_context("resolving pipeline file path", &config_path)?;
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        anchor_programs(&mut file, &root);

        // A command-line override is relative to the invoking shell, not the project.
        let appimagetool = match self.appimagetool {
            Some(tool) if is_relative_path(&tool) => Some(
                std::path::absolute(&tool)
                    .fs_context("resolving image builder path", Path::new(&tool))?
                    .to_string_lossy()
                    .into_owned(),
            ),
            other => other,
        };

        Ok(Settings::new(
            root,
            config_path,
            file,
            self.staleness,
            appimagetool,
        ))
    }
}

/// A program written as a relative path (`tools/rcc`), as opposed to a bare
/// name looked up on `PATH`.
fn is_relative_path(program: &str) -> bool {
    let path = Path::new(program);
    path.is_relative() && path.components().count() > 1
}

fn anchor(program: &mut String, root: &Path) {
    if is_relative_path(program) {
        *program = root.join(program.as_str()).to_string_lossy().into_owned();
    }
}

/// Anchors program paths in the pipeline file to its directory.
fn anchor_programs(file: &mut PipelineFile, root: &Path) {
    let mut argvs = vec![&mut file.resources.compiler, &mut file.sdist.command];
    if let Some(macos) = &mut file.macos {
        argvs.push(&mut macos.bundler);
        argvs.push(&mut macos.signing.command);
    }
    for argv in argvs {
        if let Some(program) = argv.first_mut() {
            anchor(program, root);
        }
    }
    if let Some(tool) = file.linux.as_mut().and_then(|l| l.appimage.tool.as_mut()) {
        anchor(tool, root);
    }
}

fn validate(file: &PipelineFile) -> Result<()> {
    if file.project.name.trim().is_empty() {
        return Err(Error::Config("project.name must not be empty".into()));
    }
    if file.sdist.artifact.contains('/') {
        return Err(Error::Config(format!(
            "sdist.artifact must be a file name, got `{}`",
            file.sdist.artifact
        )));
    }

    let mut commands = vec![
        ("resources.compiler", &file.resources.compiler),
        ("sdist.command", &file.sdist.command),
    ];
    if let Some(macos) = &file.macos {
        commands.push(("macos.bundler", &macos.bundler));
        commands.push(("macos.signing.command", &macos.signing.command));
        if macos.bundle_identifier.trim().is_empty() {
            return Err(Error::Config(
                "macos.bundle_identifier must not be empty".into(),
            ));
        }
    }
    for (key, argv) in commands {
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(Error::Config(format!("{key} must name a program")));
        }
    }

    if let Some(linux) = &file.linux {
        url::Url::parse(&linux.runtime.url)?;
        if let Some(sha) = &linux.runtime.sha256 {
            if sha.len() != 64 || hex::decode(sha).is_err() {
                return Err(Error::Config(format!(
                    "linux.runtime.sha256 is not a SHA-256 hex digest: `{sha}`"
                )));
            }
        }
        if linux.runtime.dir.is_empty() || linux.runtime.dir.contains('/') {
            return Err(Error::Config(
                "linux.runtime.dir must be a plain directory name".into(),
            ));
        }
    }

    Ok(())
}
