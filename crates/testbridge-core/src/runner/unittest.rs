use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::TestsRunner;
use crate::args::unittest::{get_test_run_args, FAIL_FAST_FLAG};
use crate::config::DEFAULT_RESULT_TIMEOUT_MS;
use crate::process::{
    DebugLauncher, ExecOptions, LaunchOptions, ProcessError, PythonExecutionService, Scripts,
    TestProvider,
};
use crate::results::{ResultServer, ServerEvent, TestResultData};
use crate::run::{
    run_requested_nodes, RunError, RunTestFunction, TestMessage, TestResultState, TestRun,
    TestRunInstanceOptions, TestRunOptions, TestRunRequest,
};
use crate::tree::{NodeId, TestTree};

/// Per-container bookkeeping while cases run one by one.
#[derive(Debug, Default)]
struct CaseProgress {
    total: usize,
    passed: usize,
    failed: usize,
    errored: usize,
    skipped: usize,
    tested: HashSet<String>,
    fail_fast: bool,
    stop_testing: bool,
}

/// Runs cases one at a time through the unittest launcher, which streams
/// each result back over a [`ResultServer`].
#[derive(Clone)]
pub struct UnittestRunner {
    exec: Arc<dyn PythonExecutionService>,
    debug_launcher: Arc<dyn DebugLauncher>,
    scripts: Scripts,
    result_timeout: Duration,
}

impl UnittestRunner {
    pub fn new(
        exec: Arc<dyn PythonExecutionService>,
        debug_launcher: Arc<dyn DebugLauncher>,
        scripts: Scripts,
    ) -> Self {
        Self {
            exec,
            debug_launcher,
            scripts,
            result_timeout: Duration::from_millis(DEFAULT_RESULT_TIMEOUT_MS),
        }
    }

    /// How long to wait for a case's result once its launcher has exited,
    /// unless the run options carry their own timeout.
    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    async fn run_cases(
        &self,
        tree: &TestTree,
        case_nodes: &[NodeId],
        run: &TestRun,
        options: &TestRunInstanceOptions,
        server: &mut ResultServer,
        test_args: &[String],
        progress: &mut CaseProgress,
    ) -> Result<(), RunError> {
        for case_node in case_nodes {
            if progress.stop_testing || options.token.is_cancelled() {
                break;
            }
            let Some(case) = tree[*case_node].as_case() else {
                continue;
            };

            run.set_state(*case_node, TestResultState::Running);

            let mut args = test_args.to_vec();
            args.push(format!("--result-port={}", server.port()));
            args.push(format!("-t{}", case.run_id));
            if let Some(uri) = &tree[*case_node].uri {
                args.push(format!("--testFile={}", uri.display()));
            }

            match self.launch(args, options).await {
                Err(ProcessError::Cancelled) => {
                    info!(test = %case.run_id, "Test case cancelled");
                    break;
                }
                result => result?,
            }

            let data = self
                .wait_for_result(server, &case.run_id, options, |other| {
                    record_result(tree, case_nodes, &other, run, progress)
                })
                .await?;
            record_result(tree, case_nodes, &data, run, progress);
        }
        Ok(())
    }

    async fn launch(
        &self,
        mut args: Vec<String>,
        options: &TestRunInstanceOptions,
    ) -> Result<(), ProcessError> {
        if options.debug {
            args.push("--debug".to_string());
            return self
                .debug_launcher
                .launch_debugger(LaunchOptions {
                    cwd: options.cwd.clone(),
                    args,
                    token: Some(options.token.clone()),
                    test_provider: TestProvider::Unittest,
                })
                .await;
        }

        let exec_options = ExecOptions::new(&options.cwd).with_token(Some(options.token.clone()));
        let output = self
            .exec
            .exec(&self.scripts.testlauncher(&args), &exec_options)
            .await?;
        debug!(exit_code = ?output.exit_code, "unittest launcher finished");
        Ok(())
    }

    /// Waits for the streamed result of `run_id`.
    ///
    /// Results for other tests (extra reports from a launcher, subtests) go
    /// to `on_other`. Connection, start and log events are consumed along the
    /// way; an error event fails the wait.
    async fn wait_for_result(
        &self,
        server: &mut ResultServer,
        run_id: &str,
        options: &TestRunInstanceOptions,
        mut on_other: impl FnMut(TestResultData) + Send,
    ) -> Result<TestResultData, RunError> {
        let timeout = options.result_timeout.unwrap_or(self.result_timeout);
        let next_result = async {
            while let Some(event) = server.next_event().await {
                match event {
                    ServerEvent::Result(data) if data.test == run_id => return Ok(data),
                    ServerEvent::Result(data) => on_other(data),
                    ServerEvent::Error { message, data } => {
                        error!("{message} {}", data.join(" "));
                        return Err(RunError::Protocol(message));
                    }
                    ServerEvent::Log { message, data } => info!("{message} {}", data.join(" ")),
                    ServerEvent::Connect | ServerEvent::Start => {}
                }
            }
            Err(RunError::NoResult(run_id.to_string()))
        };

        tokio::time::timeout(timeout, next_result)
            .await
            .unwrap_or_else(|_| Err(RunError::NoResult(run_id.to_string())))
    }
}

/// Applies one streamed result to the case with exactly that `run_id`.
fn record_result(
    tree: &TestTree,
    case_nodes: &[NodeId],
    data: &TestResultData,
    run: &TestRun,
    progress: &mut CaseProgress,
) {
    let matched = case_nodes.iter().copied().find_map(|node| {
        tree[node]
            .as_case()
            .filter(|case| case.run_id == data.test)
            .map(|case| (node, case))
    });
    let Some((node, case)) = matched else {
        debug!(test = %data.test, "Result for a test outside this run");
        return;
    };
    // The first result reported for a case counts.
    if !progress.tested.insert(case.run_id.clone()) {
        debug!(test = %data.test, "Duplicate result ignored");
        return;
    }

    let raw_id = &case.raw.id;
    let traceback = data
        .traceback
        .lines()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\r\n");

    match data.outcome.as_str() {
        "passed" => {
            run.set_state(node, TestResultState::Passed);
            run.append_output(&format!("{raw_id} Passed\r\n"));
            progress.passed += 1;
        }
        "failed" => {
            let text = format!("{raw_id} Failed: {}\r\n{traceback}\r\n", data.message);
            run.set_state(node, TestResultState::Failed);
            run.append_output(&text);
            run.append_message(node, TestMessage::information(text));
            progress.failed += 1;
            progress.stop_testing |= progress.fail_fast;
        }
        "error" => {
            let text = format!("{raw_id} Failed with Error: {}\r\n{traceback}\r\n", data.message);
            run.set_state(node, TestResultState::Errored);
            run.append_output(&text);
            run.append_message(node, TestMessage::error(text));
            progress.errored += 1;
            progress.stop_testing |= progress.fail_fast;
        }
        "skipped" => {
            let text = format!("{raw_id} Skipped: {}\r\n{traceback}\r\n", data.message);
            run.set_state(node, TestResultState::Skipped);
            run.append_output(&text);
            progress.skipped += 1;
        }
        other => error!(test = %raw_id, outcome = other, "Unknown outcome type"),
    }
}

#[async_trait]
impl RunTestFunction for UnittestRunner {
    async fn run_test(
        &self,
        tree: &TestTree,
        node: NodeId,
        run: &TestRun,
        options: &TestRunInstanceOptions,
    ) -> Result<(), RunError> {
        let label = &tree[node].label;
        run.append_output(&format!("Running tests: {label}\r\n"));

        let case_nodes = tree.test_case_nodes(node);
        let mut test_args = get_test_run_args(&options.args);
        let mut progress = CaseProgress {
            total: case_nodes.len(),
            fail_fast: test_args.iter().any(|arg| arg == FAIL_FAST_FLAG),
            ..CaseProgress::default()
        };
        test_args.retain(|arg| arg != FAIL_FAST_FLAG);

        let mut server = ResultServer::start().await?;
        let result = self
            .run_cases(tree, &case_nodes, run, options, &mut server, &test_args, &mut progress)
            .await;
        server.stop();

        if let Err(e) = &result {
            error!(error = %e, "unittest run failed");
            run.append_output(&format!("Error while running tests: {label}\r\n{e}\r\n\r\n"));
        }

        run.append_output(&format!("Total number of tests passed: {}\r\n", progress.passed));
        run.append_output(&format!("Total number of tests failed: {}\r\n", progress.failed));
        run.append_output(&format!(
            "Total number of tests failed with errors: {}\r\n",
            progress.errored
        ));
        run.append_output(&format!("Total number of tests skipped: {}\r\n", progress.skipped));
        if progress.fail_fast {
            run.append_output(&format!(
                "Total number of tests skipped due to fail fast: {}\r\n",
                progress.total - progress.tested.len()
            ));
        }

        result
    }
}

#[async_trait]
impl TestsRunner for UnittestRunner {
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
