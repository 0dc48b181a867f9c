use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempPath;
use tracing::debug;

use super::TestsRunner;
use crate::args::pytest::{junit_file_from_args, prepare_arguments_for_run};
use crate::process::{
    pytest_module, DebugLauncher, ExecOptions, LaunchOptions, PythonExecutionService, TestProvider,
};
use crate::results::update_result_from_junit_xml;
use crate::run::{
    run_requested_nodes, RunError, RunTestFunction, TestResultState, TestRun,
    TestRunInstanceOptions, TestRunOptions, TestRunRequest,
};
use crate::tree::{NodeId, TestTree};

/// Where pytest writes its results for one node.
enum JunitFile {
    /// The single `--junit-xml` the user configured.
    User(PathBuf),
    /// Removed when dropped.
    Temp(TempPath),
}

impl JunitFile {
    fn for_args(args: &[String], cwd: &Path) -> Result<Self, RunError> {
        if let Some(path) = junit_file_from_args(args) {
            return Ok(JunitFile::User(cwd.join(path)));
        }
        let temp = tempfile::Builder::new()
            .prefix("testbridge-")
            .suffix(".xml")
            .tempfile()?
            .into_temp_path();
        Ok(JunitFile::Temp(temp))
    }

    fn path(&self) -> &Path {
        match self {
            JunitFile::User(path) => path,
            JunitFile::Temp(path) => path,
        }
    }
}

/// Runs nodes with pytest and reconciles them from JUnit XML.
#[derive(Clone)]
pub struct PytestRunner {
    exec: Arc<dyn PythonExecutionService>,
    debug_launcher: Arc<dyn DebugLauncher>,
}

impl PytestRunner {
    pub fn new(exec: Arc<dyn PythonExecutionService>, debug_launcher: Arc<dyn DebugLauncher>) -> Self {
        Self {
            exec,
            debug_launcher,
        }
    }

    async fn run_node(
        &self,
        tree: &TestTree,
        node: NodeId,
        run: &TestRun,
        options: &TestRunInstanceOptions,
    ) -> Result<(), RunError> {
        let test_node = &tree[node];
        let junit_file = JunitFile::for_args(&options.args, &options.cwd)?;

        let raw_id = test_node.raw_id().unwrap_or(&test_node.id);
        let test_args = prepare_arguments_for_run(
            &options.args,
            &options.workspace_folder,
            junit_file.path(),
            raw_id,
        );

        run.append_output(&format!(
            "Running test with arguments: {}\r\n",
            test_args.join(" ")
        ));
        run.append_output(&format!(
            "Current working directory: {}\r\n",
            options.cwd.display()
        ));
        run.append_output(&format!(
            "Workspace directory: {}\r\n",
            options.workspace_folder.display()
        ));

        if options.debug {
            let mut debugger_args = vec![
                options.cwd.to_string_lossy().into_owned(),
                "pytest".to_string(),
            ];
            debugger_args.extend(test_args);
            self.debug_launcher
                .launch_debugger(LaunchOptions {
                    cwd: options.cwd.clone(),
                    args: debugger_args,
                    token: Some(options.token.clone()),
                    test_provider: TestProvider::Pytest,
                })
                .await?;
        } else {
            let exec_options = ExecOptions::new(&options.cwd).with_token(Some(options.token.clone()));
            let output = self.exec.exec(&pytest_module(&test_args), &exec_options).await?;
            debug!(exit_code = ?output.exit_code, "pytest finished");
            if !output.stdout.is_empty() {
                run.append_output(&output.stdout.replace('\n', "\r\n"));
            }
        }

        run.append_output("Run completed, parsing output\r\n");
        update_result_from_junit_xml(junit_file.path(), tree, node, run).await?;
        Ok(())
    }
}

#[async_trait]
impl RunTestFunction for PytestRunner {
    async fn run_test(
        &self,
        tree: &TestTree,
        node: NodeId,
        run: &TestRun,
        options: &TestRunInstanceOptions,
    ) -> Result<(), RunError> {
        let label = &tree[node].label;
        run.append_output(&format!("Running tests: {label}\r\n"));

        // States are reported on leaves only; hosts derive container states.
        for case in tree.test_case_nodes(node) {
            run.set_state(case, TestResultState::Running);
        }

        let result = self.run_node(tree, node, run, options).await;
        if let Err(e) = &result {
            run.append_output(&format!("Error while running tests: {label}\r\n{e}\r\n\r\n"));
        }
        result
    }

    /// A results file named by the user is shared by every node, so nodes
    /// must not overwrite it while a sibling is still reading it.
    fn run_sequentially(&self, options: &TestRunInstanceOptions) -> bool {
        options.debug || junit_file_from_args(&options.args).is_some()
    }
}

#[async_trait]
impl TestsRunner for PytestRunner {
    async fn run_tests(
        &self,
        tree: &TestTree,
        request: &TestRunRequest,
        options: TestRunOptions,
        run: &TestRun,
    ) {
        let options = TestRunInstanceOptions::new(options, request);
        run_requested_nodes(tree, request, run, &options, self).await;
    }
}
