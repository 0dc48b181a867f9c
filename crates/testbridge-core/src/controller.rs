//! Host-facing controllers.
//!
//! Each call reads the workspace settings again, so enabling a different
//! runner or changing its working directory, arguments or result timeout
//! takes effect on the next call. The interpreter and the helper scripts
//! directory belong to the execution services and are fixed when those are
//! built.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::config::{Config, ConfigError, ConfigurationService};
use crate::discovery::{
    DiscoveryError, PytestDiscoveryService, PythonDiscoveryHelper, TestDiscovery,
    TestDiscoveryOptions, UnittestDiscoveryService,
};
use crate::process::{DebugLauncher, PythonExecutionService, Scripts};
use crate::run::{TestRun, TestRunOptions, TestRunRequest};
use crate::runner::{PytestRunner, TestsRunner, UnittestRunner};
use crate::tree::TestTree;

/// Controller errors.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// What a host needs from a test framework integration.
#[async_trait]
pub trait TestController: Send + Sync {
    /// Discovers the tests of one workspace folder.
    async fn create_workspace_tests(
        &self,
        workspace: &Path,
        token: &CancellationToken,
    ) -> Result<Option<TestTree>, ControllerError>;

    /// Runs `request` against `tree`. `run` is ended when this returns.
    async fn run_tests(
        &self,
        tree: &TestTree,
        request: &TestRunRequest,
        token: &CancellationToken,
        run: &TestRun,
    ) -> Result<(), ControllerError>;
}

/// Reads settings for `workspace`, ending `run` when that fails.
fn run_settings(
    config: &dyn ConfigurationService,
    workspace: &Path,
    run: &TestRun,
) -> Result<Config, ControllerError> {
    config.settings(workspace).map_err(|e| {
        run.append_output(&format!("Error while running tests:\r\n{e}\r\n\r\n"));
        run.end();
        ControllerError::from(e)
    })
}

/// The pytest integration.
#[derive(Clone)]
pub struct PytestController {
    discovery: Arc<dyn TestDiscovery>,
    runner: Arc<dyn TestsRunner>,
    config: Arc<dyn ConfigurationService>,
}

impl PytestController {
    pub fn new(
        discovery: Arc<dyn TestDiscovery>,
        runner: Arc<dyn TestsRunner>,
        config: Arc<dyn ConfigurationService>,
    ) -> Self {
        Self {
            discovery,
            runner,
            config,
        }
    }
}

#[async_trait]
impl TestController for PytestController {
    async fn create_workspace_tests(
        &self,
        workspace: &Path,
        token: &CancellationToken,
    ) -> Result<Option<TestTree>, ControllerError> {
        let settings = self.config.settings(workspace)?;
        let options = TestDiscoveryOptions {
            workspace_folder: workspace.to_path_buf(),
            cwd: settings.testing.cwd_or(workspace),
            args: settings.testing.pytest_args.clone(),
            token: Some(token.clone()),
            ignore_cache: true,
        };
        Ok(self.discovery.discover_workspace_tests(&options).await?)
    }

    async fn run_tests(
        &self,
        tree: &TestTree,
        request: &TestRunRequest,
        token: &CancellationToken,
        run: &TestRun,
    ) -> Result<(), ControllerError> {
        let workspace = tree.workspace_folder();
        let settings = run_settings(self.config.as_ref(), workspace, run)?;
        let options = TestRunOptions {
            workspace_folder: workspace.to_path_buf(),
            cwd: settings.testing.cwd_or(workspace),
            args: settings.testing.pytest_args.clone(),
            token: token.clone(),
            result_timeout: Some(settings.testing.result_timeout()),
        };
        self.runner.run_tests(tree, request, options, run).await;
        Ok(())
    }
}

/// The unittest integration.
#[derive(Clone)]
pub struct UnittestController {
    discovery: Arc<dyn TestDiscovery>,
    runner: Arc<dyn TestsRunner>,
    config: Arc<dyn ConfigurationService>,
}

impl UnittestController {
    pub fn new(
        discovery: Arc<dyn TestDiscovery>,
        runner: Arc<dyn TestsRunner>,
        config: Arc<dyn ConfigurationService>,
    ) -> Self {
        Self {
            discovery,
            runner,
            config,
        }
    }
}

#[async_trait]
impl TestController for UnittestController {
    async fn create_workspace_tests(
        &self,
        workspace: &Path,
        token: &CancellationToken,
    ) -> Result<Option<TestTree>, ControllerError> {
        let settings = self.config.settings(workspace)?;
        let options = TestDiscoveryOptions {
            workspace_folder: workspace.to_path_buf(),
            cwd: settings.testing.cwd_or(workspace),
            args: settings.testing.unittest_args.clone(),
            token: Some(token.clone()),
            ignore_cache: true,
        };
        Ok(self.discovery.discover_workspace_tests(&options).await?)
    }

    async fn run_tests(
        &self,
        tree: &TestTree,
        request: &TestRunRequest,
        token: &CancellationToken,
        run: &TestRun,
    ) -> Result<(), ControllerError> {
        let workspace = tree.workspace_folder();
        let settings = run_settings(self.config.as_ref(), workspace, run)?;
        let options = TestRunOptions {
            workspace_folder: workspace.to_path_buf(),
            cwd: settings.testing.cwd_or(workspace),
            args: settings.testing.unittest_args.clone(),
            token: token.clone(),
            result_timeout: Some(settings.testing.result_timeout()),
        };
        self.runner.run_tests(tree, request, options, run).await;
        Ok(())
    }
}

/// Routes every call to whichever runner the settings enable, pytest first.
#[derive(Clone)]
pub struct PythonTestController {
    config: Arc<dyn ConfigurationService>,
    pytest: Arc<dyn TestController>,
    unittest: Arc<dyn TestController>,
}

impl PythonTestController {
    pub fn new(
        config: Arc<dyn ConfigurationService>,
        pytest: Arc<dyn TestController>,
        unittest: Arc<dyn TestController>,
    ) -> Self {
        Self {
            config,
            pytest,
            unittest,
        }
    }

    /// Wires both integrations over the given collaborators.
    pub fn from_services(
        config: Arc<dyn ConfigurationService>,
        exec: Arc<dyn PythonExecutionService>,
        debug_launcher: Arc<dyn DebugLauncher>,
        scripts: Scripts,
    ) -> Self {
        let helper = Arc::new(PythonDiscoveryHelper::new(exec.clone()));
        let pytest = PytestController::new(
            Arc::new(PytestDiscoveryService::new(helper, scripts.clone())),
            Arc::new(PytestRunner::new(exec.clone(), debug_launcher.clone())),
            config.clone(),
        );
        let unittest = UnittestController::new(
            Arc::new(UnittestDiscoveryService::new(exec.clone())),
            Arc::new(UnittestRunner::new(exec, debug_launcher, scripts)),
            config.clone(),
        );
        Self::new(config, Arc::new(pytest), Arc::new(unittest))
    }

    fn active(&self, settings: &Config) -> Option<&dyn TestController> {
        if settings.testing.pytest_enabled {
            Some(self.pytest.as_ref())
        } else if settings.testing.unittest_enabled {
            Some(self.unittest.as_ref())
        } else {
            None
        }
    }
}

#[async_trait]
impl TestController for PythonTestController {
    async fn create_workspace_tests(
        &self,
        workspace: &Path,
        token: &CancellationToken,
    ) -> Result<Option<TestTree>, ControllerError> {
        let settings = self.config.settings(workspace)?;
        match self.active(&settings) {
            Some(controller) => controller.create_workspace_tests(workspace, token).await,
            None => {
                debug!(workspace = %workspace.display(), "No test framework enabled");
                Ok(None)
            }
        }
    }

    async fn run_tests(
        &self,
        tree: &TestTree,
        request: &TestRunRequest,
        token: &CancellationToken,
        run: &TestRun,
    ) -> Result<(), ControllerError> {
        let settings = run_settings(self.config.as_ref(), tree.workspace_folder(), run)?;
        match self.active(&settings) {
            Some(controller) => controller.run_tests(tree, request, token, run).await,
            None => {
                debug!("No test framework enabled");
                run.end();
                Ok(())
            }
        }
    }
}
