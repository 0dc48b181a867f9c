//! Discovery services: invoke a runner in discovery mode and turn its output
//! into a [`TestTree`].

mod helper;
mod pytest;
mod unittest;

pub use helper::{PythonDiscoveryHelper, TestDiscoveryHelper};
pub use pytest::{build_pytest_tree, PytestDiscoveryService};
pub use unittest::{discovery_script, get_test_ids, parse_test_ids, UnittestDiscoveryService};

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::cancel::CancellationToken;
use crate::process::{ExecOptions, ProcessError};
use crate::tree::TestTree;

/// Discovery errors.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Discovery process failed: {0}")]
    Process(#[from] ProcessError),

    #[error("Invalid discovery output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

impl DiscoveryError {
    /// True when the error only reflects a cancelled invocation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DiscoveryError::Process(ProcessError::Cancelled))
    }
}

/// Inputs for one discovery pass.
#[derive(Debug, Clone)]
pub struct TestDiscoveryOptions {
    pub workspace_folder: PathBuf,
    pub cwd: PathBuf,
    pub args: Vec<String>,
    pub token: Option<CancellationToken>,
    pub ignore_cache: bool,
}

impl TestDiscoveryOptions {
    pub fn new(workspace_folder: impl Into<PathBuf>, cwd: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            workspace_folder: workspace_folder.into(),
            cwd: cwd.into(),
            args,
            token: None,
            ignore_cache: false,
        }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub(crate) fn exec_options(&self) -> ExecOptions {
        ExecOptions::new(&self.cwd).with_token(self.token.clone())
    }
}

/// One discovery back-end.
///
/// "No tests found" is `Ok(None)`, as is a cancelled discovery.
#[async_trait]
pub trait TestDiscovery: Send + Sync {
    async fn discover_workspace_tests(
        &self,
        options: &TestDiscoveryOptions,
    ) -> Result<Option<TestTree>, DiscoveryError>;
}
