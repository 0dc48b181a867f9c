//! Interpreter process execution and debugger launch seams.
//!
//! Discovery and runs never spawn processes directly; they go through
//! [`PythonExecutionService`] and [`DebugLauncher`] so that hosts and tests
//! can substitute their own.

mod scripts;

pub use scripts::{exec_code, pytest_module, Scripts};

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::config::{InterpreterConfig, PYTEST_PROVIDER, UNITTEST_PROVIDER};

/// Process errors.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to run process: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process wrote to stderr: {0}")]
    StdErr(String),

    #[error("Process was cancelled")]
    Cancelled,

    #[error("Debugging is not available for {0}")]
    DebugUnavailable(TestProvider),
}

/// Options for one interpreter invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub cwd: Option<PathBuf>,
    pub token: Option<CancellationToken>,
    /// Treat any stderr output as a failure.
    pub throw_on_stderr: bool,
}

impl ExecOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: Option<CancellationToken>) -> Self {
        self.token = token;
        self
    }

    pub fn throw_on_stderr(mut self) -> Self {
        self.throw_on_stderr = true;
        self
    }
}

/// Captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Self::default()
        }
    }
}

/// Runs the interpreter with the given arguments.
#[async_trait]
pub trait PythonExecutionService: Send + Sync {
    async fn exec(
        &self,
        args: &[String],
        options: &ExecOptions,
    ) -> Result<ExecutionResult, ProcessError>;
}

/// [`PythonExecutionService`] backed by a real interpreter process.
///
/// Children are killed when the invocation is cancelled or dropped.
#[derive(Debug, Clone)]
pub struct PythonProcess {
    python_path: String,
}

impl PythonProcess {
    pub fn new(python_path: impl Into<String>) -> Self {
        Self {
            python_path: python_path.into(),
        }
    }

    pub fn from_config(config: &InterpreterConfig) -> Self {
        Self::new(config.python_path.clone())
    }

    pub fn python_path(&self) -> &str {
        &self.python_path
    }
}

#[async_trait]
impl PythonExecutionService for PythonProcess {
    async fn exec(
        &self,
        args: &[String],
        options: &ExecOptions,
    ) -> Result<ExecutionResult, ProcessError> {
        debug!(python = %self.python_path, ?args, cwd = ?options.cwd, "Executing interpreter");

        let mut command = Command::new(&self.python_path);
        command
            .args(args)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn()?;
        let output = match &options.token {
            Some(token) => {
                tokio::select! {
                    output = child.wait_with_output() => output?,
                    _ = token.cancelled() => {
                        debug!("Interpreter invocation cancelled");
                        return Err(ProcessError::Cancelled);
                    }
                }
            }
            None => child.wait_with_output().await?,
        };

        let result = ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        debug!(exit_code = ?result.exit_code, "Interpreter finished");

        if options.throw_on_stderr && !result.stderr.trim().is_empty() {
            return Err(ProcessError::StdErr(result.stderr));
        }
        Ok(result)
    }
}

/// The runner a debug session is launched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestProvider {
    Pytest,
    Unittest,
}

impl TestProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestProvider::Pytest => PYTEST_PROVIDER,
            TestProvider::Unittest => UNITTEST_PROVIDER,
        }
    }
}

impl fmt::Display for TestProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A debug session request.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub cwd: PathBuf,
    pub args: Vec<String>,
    pub token: Option<CancellationToken>,
    pub test_provider: TestProvider,
}

/// Launches a runner under a debugger and waits for the session to end.
#[async_trait]
pub trait DebugLauncher: Send + Sync {
    async fn launch_debugger(&self, options: LaunchOptions) -> Result<(), ProcessError>;
}

/// A [`DebugLauncher`] for hosts without a debugger.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableDebugLauncher;

#[async_trait]
impl DebugLauncher for UnavailableDebugLauncher {
    async fn launch_debugger(&self, options: LaunchOptions) -> Result<(), ProcessError> {
        Err(ProcessError::DebugUnavailable(options.test_provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_options_builder() {
        let token = CancellationToken::new();
        let options = ExecOptions::new("/repo")
            .with_token(Some(token))
            .throw_on_stderr();
        assert_eq!(options.cwd, Some(PathBuf::from("/repo")));
        assert!(options.token.is_some());
        assert!(options.throw_on_stderr);
    }

    #[test]
    fn test_provider_names() {
        assert_eq!(TestProvider::Pytest.to_string(), "pytest");
        assert_eq!(TestProvider::Unittest.as_str(), "unittest");
    }

    #[tokio::test]
    async fn test_unavailable_debugger() {
        let result = UnavailableDebugLauncher
            .launch_debugger(LaunchOptions {
                cwd: PathBuf::from("/repo"),
                args: vec![],
                token: None,
                test_provider: TestProvider::Unittest,
            })
            .await;
        assert!(matches!(
            result,
            Err(ProcessError::DebugUnavailable(TestProvider::Unittest))
        ));
    }
}
