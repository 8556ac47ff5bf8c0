//! Operator-facing terminal output.
//!
//! Progress and results go to stdout, warnings and errors to stderr. Logging
//! (`log` + `env_logger`) is separate and carries stage detail.

use std::io::{self, Write};

/// Prints user-facing messages honoring `--verbose` and `--quiet`.
#[derive(Debug, Clone, Copy)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
}

impl OutputManager {
    /// Creates an output manager; `quiet` wins over `verbose`.
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose: verbose && !quiet,
            quiet,
        }
    }

    /// Whether verbose output is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn out(&self, line: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{line}")
    }

    fn err(&self, line: &str) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{line}")
    }

    /// Print message only in verbose mode.
    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if self.verbose {
            self.out(message)?;
        }
        Ok(())
    }

    /// Print a progress line.
    pub fn progress(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.out(&format!("→ {message}"))
    }

    /// Print a success line.
    pub fn success(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.out(&format!("✓ {message}"))
    }

    /// Print a warning (suppressed by `--quiet`).
    pub fn warn(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.err(&format!("⚠ {message}"))
    }

    /// Print an error; never suppressed.
    pub fn error(&self, message: &str) -> io::Result<()> {
        self.err(&format!("✗ {message}"))
    }

    /// Print a section header.
    pub fn section(&self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.out("")?;
        self.out(title)?;
        self.out(&"─".repeat(title.chars().count()))
    }

    /// Print an indented line.
    pub fn indent(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        self.out(&format!("  {message}"))
    }

    /// Print a result line that must survive `--quiet` (e.g. artifact paths).
    pub fn result(&self, message: &str) -> io::Result<()> {
        self.out(message)
    }
}
