use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::info;

use super::{RunError, TestRun, TestRunInstanceOptions, TestRunRequest};
use crate::tree::{NodeId, TestData, TestTree};

/// Runner-specific execution of one folder, file, collection or case.
#[async_trait]
pub trait RunTestFunction: Send + Sync {
    async fn run_test(
        &self,
        tree: &TestTree,
        node: NodeId,
        run: &TestRun,
        options: &TestRunInstanceOptions,
    ) -> Result<(), RunError>;

    /// Whether sibling nodes must run one after another.
    ///
    /// Debug runs always do, so that debugger sessions do not overlap.
    fn run_sequentially(&self, options: &TestRunInstanceOptions) -> bool {
        options.debug
    }
}

/// Runs `node` unless it is excluded.
///
/// Workspace roots fan out to their children; every other node is handed to
/// `runner` as one unit.
pub fn process_test_node<'a>(
    tree: &'a TestTree,
    node: NodeId,
    run: &'a TestRun,
    options: &'a TestRunInstanceOptions,
    runner: &'a dyn RunTestFunction,
) -> BoxFuture<'a, Result<(), RunError>> {
    async move {
        let test_node = &tree[node];
        if options.exclude.contains(&node) {
            run.append_output(&format!("Excluded: {}\r\n", test_node.label));
            return Ok(());
        }
        match test_node.data {
            TestData::WorkspaceRoot => dispatch(tree, tree.children(node), run, options, runner).await,
            TestData::Folder(_)
            | TestData::File(_)
            | TestData::Collection(_)
            | TestData::Case(_) => runner.run_test(tree, node, run, options).await,
        }
    }
    .boxed()
}

/// Processes `nodes` concurrently, or one after another when
/// [`RunTestFunction::run_sequentially`] asks for it.
///
/// The first error is returned; the other nodes still run to completion.
pub async fn dispatch(
    tree: &TestTree,
    nodes: &[NodeId],
    run: &TestRun,
    options: &TestRunInstanceOptions,
    runner: &dyn RunTestFunction,
) -> Result<(), RunError> {
    if runner.run_sequentially(options) {
        let mut first_error = None;
        for node in nodes {
            if let Err(e) = process_test_node(tree, *node, run, options, runner).await {
                first_error.get_or_insert(e);
            }
        }
        return first_error.map_or(Ok(()), Err);
    }

    join_all(
        nodes
            .iter()
            .map(|node| process_test_node(tree, *node, run, options, runner)),
    )
    .await
    .into_iter()
    .collect()
}

/// Drives a whole request and finalizes the run.
///
/// Errors are reported to the run output. Cancellation ends the run right
/// away and drops whatever is still in flight.
pub async fn run_requested_nodes(
    tree: &TestTree,
    request: &TestRunRequest,
    run: &TestRun,
    options: &TestRunInstanceOptions,
    runner: &dyn RunTestFunction,
) {
    let result = tokio::select! {
        biased;
        _ = options.token.cancelled() => {
            info!(run = %run.id(), "Test run cancelled");
            run.end();
            Ok(())
        }
        result = dispatch(tree, &request.tests, run, options, runner) => result,
    };

    if let Err(e) = result {
        run.append_output(&format!("Error while running tests:\r\n{e}\r\n\r\n"));
    }
    run.append_output("Finished running tests!\r\n");
    run.end();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::raw::{RawParentKind, RawTestParent};
    use crate::tree::{TestFile, TestNode};
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl RunTestFunction for Recorder {
        async fn run_test(
            &self,
            tree: &TestTree,
            node: NodeId,
            _run: &TestRun,
            _options: &TestRunInstanceOptions,
        ) -> Result<(), RunError> {
            let label = tree[node].label.clone();
            self.seen.lock().unwrap().push(label.clone());
            if self.fail_on.as_deref() == Some(label.as_str()) {
                return Err(RunError::NoResult(label));
            }
            Ok(())
        }
    }

    fn file(name: &str) -> TestNode {
        TestFile::create(
            Path::new("/repo"),
            &RawTestParent {
                id: format!("./{name}"),
                name: name.to_string(),
                parentid: ".".to_string(),
                kind: RawParentKind::File,
                relpath: Some(format!("./{name}")),
            },
        )
    }

    fn tree() -> (TestTree, NodeId, NodeId) {
        let mut tree = TestTree::new("/repo", TestNode::workspace_root("pytest", "Pytest Tests", "/repo"));
        let root = tree.root();
        let a = tree.add_child(root, file("test_a.py"));
        let b = tree.add_child(root, file("test_b.py"));
        (tree, a, b)
    }

    fn options(exclude: &[NodeId], debug: bool) -> TestRunInstanceOptions {
        TestRunInstanceOptions {
            workspace_folder: "/repo".into(),
            cwd: "/repo".into(),
            args: vec![],
            token: CancellationToken::new(),
            result_timeout: None,
            exclude: exclude.iter().copied().collect::<HashSet<_>>(),
            debug,
        }
    }

    #[tokio::test]
    async fn test_root_fans_out_and_exclusions_are_reported() {
        let (tree, _, b) = tree();
        let runner = Recorder {
            seen: Mutex::new(vec![]),
            fail_on: None,
        };
        let run = TestRun::new();
        let request = TestRunRequest {
            tests: vec![tree.root()],
            exclude: vec![b],
            debug: false,
        };
        let options = options(&request.exclude, false);

        run_requested_nodes(&tree, &request, &run, &options, &runner).await;

        assert_eq!(*runner.seen.lock().unwrap(), vec!["test_a.py"]);
        let output = run.output();
        assert!(output.contains("Excluded: test_b.py\r\n"));
        assert!(output.ends_with("Finished running tests!\r\n"));
        assert!(run.is_ended());
    }

    #[tokio::test]
    async fn test_errors_are_reported_and_siblings_still_run() {
        let (tree, a, b) = tree();
        let runner = Recorder {
            seen: Mutex::new(vec![]),
            fail_on: Some("test_a.py".to_string()),
        };
        let run = TestRun::new();
        let request = TestRunRequest {
            tests: vec![a, b],
            exclude: vec![],
            debug: true,
        };
        let options = options(&[], true);

        run_requested_nodes(&tree, &request, &run, &options, &runner).await;

        assert_eq!(*runner.seen.lock().unwrap(), vec!["test_a.py", "test_b.py"]);
        assert!(run
            .output()
            .contains("Error while running tests:\r\nNo result received for test_a.py\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_cancelled_run_ends_immediately() {
        let (tree, a, _) = tree();
        let runner = Recorder {
            seen: Mutex::new(vec![]),
            fail_on: None,
        };
        let run = TestRun::new();
        let options = options(&[], false);
        options.token.cancel();

        run_requested_nodes(&tree, &TestRunRequest::new(vec![a]), &run, &options, &runner).await;

        assert!(run.is_ended());
        assert!(!run.output().contains("Finished running tests!"));
    }
}
