//! External process execution.
//!
//! Every tool the pipeline drives (`lipo`, `codesign`, `hdiutil`, `cmake`,
//! `sentry-cli`, ...) goes through [`ProcessRunner`]. Production code uses
//! [`SystemRunner`]; tests substitute scripted runners.

use crate::bundler::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Placeholder printed instead of secret arguments.
const REDACTED: &str = "***";

/// A program plus its arguments.
///
/// Arguments added with [`Invocation::secret`] are replaced by `***`
/// whenever the command line is displayed, logged or put into an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    secret_positions: Vec<usize>,
    current_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl Invocation {
    /// Start an invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret_positions: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a path argument.
    pub fn path(self, path: impl AsRef<Path>) -> Self {
        self.arg(path.as_ref().to_string_lossy().into_owned())
    }

    /// Append an argument that must never be printed.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        self.secret_positions.push(self.args.len());
        self.args.push(value.into());
        self
    }

    /// Run the program from `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for the child only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Program name as given.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Raw arguments, secrets included.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory override, if any.
    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Extra environment for the child.
    pub fn environment(&self) -> &[(String, String)] {
        &self.envs
    }

    /// Command line with secrets masked.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for (index, arg) in self.args.iter().enumerate() {
            line.push(' ');
            if self.secret_positions.contains(&index) {
                line.push_str(REDACTED);
            } else if arg.contains(char::is_whitespace) {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl ProcessOutput {
    /// Successful output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the process exited with status 0.
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    fn status_label(&self) -> String {
        match self.code {
            Some(code) => format!("status {code}"),
            None => "signal".to_string(),
        }
    }

    /// Turn a non-zero exit into [`Error::ToolFailed`].
    pub fn into_checked(self, invocation: &Invocation) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(Error::ToolFailed {
            command: invocation.display(),
            status: self.status_label(),
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs external programs.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion and return whatever the process produced.
    ///
    /// Only a failure to spawn is an error here; a non-zero exit is reported
    /// through [`ProcessOutput::code`].
    async fn execute(&self, invocation: &Invocation) -> Result<ProcessOutput>;

    /// Run and require a zero exit status.
    async fn run(&self, invocation: &Invocation) -> Result<()> {
        self.execute(invocation).await?.into_checked(invocation)?;
        Ok(())
    }

    /// Run, require a zero exit status and return the captured output.
    async fn capture(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        self.execute(invocation).await?.into_checked(invocation)
    }
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a runner that spawns real processes.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn execute(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        log::info!("$ {}", invocation.display());

        let mut command = tokio::process::Command::new(invocation.program());
        command.args(invocation.arguments());
        if let Some(dir) = invocation.working_dir() {
            command.current_dir(dir);
        }
        for (key, value) in invocation.environment() {
            command.env(key, value);
        }

        let output = command.output().await.map_err(|error| Error::CommandFailed {
            command: invocation.display(),
            error,
        })?;

        let result = ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        for line in result.stdout.lines().filter(|l| !l.trim().is_empty()) {
            log::debug!("{}: {}", invocation.program(), line);
        }
        if !result.is_success() {
            for line in result.stderr.lines().filter(|l| !l.trim().is_empty()) {
                log::warn!("{}: {}", invocation.program(), line);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_masks_secrets() {
        let invocation = Invocation::new("xcrun")
            .args(["notarytool", "submit", "--password"])
            .secret("hunter2")
            .arg("App Name.dmg");

        let line = invocation.display();
        assert_eq!(line, "xcrun notarytool submit --password *** \"App Name.dmg\"");
        assert!(!line.contains("hunter2"));
        assert_eq!(invocation.arguments()[3], "hunter2");
    }

    #[test]
    fn test_into_checked_reports_redacted_command() {
        let invocation = Invocation::new("sentry-cli").arg("--auth-token").secret("abc");
        let err = ProcessOutput::failure(2, "bad token\n")
            .into_checked(&invocation)
            .unwrap_err();

        match err {
            Error::ToolFailed { command, status, stderr } => {
                assert_eq!(command, "sentry-cli --auth-token ***");
                assert_eq!(status, "status 2");
                assert_eq!(stderr, "bad token");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_system_runner_reports_spawn_failure() {
        let runner = SystemRunner::new();
        let err = runner
            .execute(&Invocation::new("definitely-not-a-real-tool-7f3a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
    }
}
