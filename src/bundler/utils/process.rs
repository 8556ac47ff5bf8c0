//! External tool invocation.
//!
//! Every tool the pipeline drives goes through [`ToolCommand`]: the program is
//! resolved up front (a missing tool is an input problem, not a tool
//! failure), output is captured and forwarded to the log, and a non-zero exit
//! becomes [`Error::ToolFailure`] carrying the tool's own diagnostics.

use crate::bundler::error::{Error, Result};
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Stdio,
};

/// Captured output of a successful tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

/// Builder for one external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
}

impl ToolCommand {
    /// Starts a command for `program`.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    /// Starts a command from a configured argv (`["poetry", "build", ...]`).
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when `argv` is empty.
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, rest) = argv
            .split_first()
            .ok_or_else(|| Error::Config("empty tool command".to_string()))?;
        Ok(Self::new(program).args(rest))
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Sets an environment variable for the child.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Display name used in logs and errors.
    pub fn program_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .unwrap_or(&self.program)
            .to_string_lossy()
            .into_owned()
    }

    /// Resolves the program on `PATH`, or as a path when it contains a
    /// separator.
    ///
    /// Relative paths are taken from the invoking process, never from the
    /// child's working directory; settings anchor configured ones to the
    /// project root before they get here.
    pub fn resolve(&self) -> Result<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 || program.is_absolute() {
            let candidate = std::path::absolute(program).map_err(|e| Error::ToolNotFound {
                tool: program.display().to_string(),
                reason: e.to_string(),
            })?;
            if candidate.is_file() {
                return Ok(candidate);
            }
            return Err(Error::ToolNotFound {
                tool: program.display().to_string(),
                reason: "no such file".to_string(),
            });
        }

        which::which(&self.program).map_err(|e| Error::ToolNotFound {
            tool: self.program_name(),
            reason: e.to_string(),
        })
    }

    /// Runs the tool to completion.
    ///
    /// # Errors
    ///
    /// - [`Error::ToolNotFound`] if the program cannot be resolved or spawned
    /// - [`Error::ToolFailure`] on a non-zero exit
    pub async fn run(&self) -> Result<ToolOutput> {
        let program = self.resolve()?;
        let name = self.program_name();

        log::debug!(
            "Running {} {}",
            program.display(),
            self.args
                .iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut command = tokio::process::Command::new(&program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| Error::ToolNotFound {
            tool: name.clone(),
            reason: format!("failed to execute {}: {}", program.display(), e),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stdout.lines() {
            log::debug!("[{}] {}", name, line);
        }
        for line in stderr.lines() {
            log::debug!("[{}] {}", name, line);
        }

        if !output.status.success() {
            let diagnostics = if stderr.trim().is_empty() {
                stdout
            } else {
                stderr
            };
            return Err(Error::ToolFailure {
                tool: name,
                status: output.status.code(),
                diagnostics,
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bundler::ErrorKind;

    #[tokio::test]
    async fn failure_carries_diagnostics() {
        let err = ToolCommand::new("sh")
            .args(["-c", "echo 'bad manifest' >&2; exit 3"])
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolFailure);
        match err {
            Error::ToolFailure {
                tool,
                status,
                diagnostics,
            } => {
                assert_eq!(tool, "sh");
                assert_eq!(status, Some(3));
                assert!(diagnostics.contains("bad manifest"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_an_input_error() {
        let err = ToolCommand::new("definitely-not-a-real-tool-4821")
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[tokio::test]
    async fn tool_path_ignores_child_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("work/tools")).unwrap();
        std::fs::write(dir.path().join("work/tools/decoy"), "#!/bin/sh\n").unwrap();

        let err = ToolCommand::new("tools/decoy")
            .current_dir(dir.path().join("work"))
            .resolve()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);

        let program = dir.path().join("work/tools/decoy");
        let found = ToolCommand::new(&program)
            .current_dir(dir.path())
            .resolve()
            .unwrap();
        assert_eq!(found, program);
    }

    #[tokio::test]
    async fn env_and_cwd_reach_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let out = ToolCommand::from_argv(&["sh".into(), "-c".into(), "echo $ARCH; pwd".into()])
            .unwrap()
            .env("ARCH", "x86_64")
            .current_dir(dir.path())
            .run()
            .await
            .unwrap();
        let mut lines = out.stdout.lines();
        assert_eq!(lines.next(), Some("x86_64"));
        let cwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(
            cwd.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
