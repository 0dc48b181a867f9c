use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info};

use super::{DiscoveryError, TestDiscovery, TestDiscoveryHelper, TestDiscoveryOptions};
use crate::args::pytest::{get_test_folders, prepare_arguments_for_discovery, DiscoveryArgsOptions};
use crate::config::{PYTEST_ROOT_ID, PYTEST_ROOT_LABEL};
use crate::process::Scripts;
use crate::raw::RawDiscoveredTests;
use crate::tree::{base_name, update_test_root, TestNode, TestTree};

/// Discovery through the pytest adapter's JSON output.
#[derive(Clone)]
pub struct PytestDiscoveryService {
    helper: Arc<dyn TestDiscoveryHelper>,
    scripts: Scripts,
}

impl PytestDiscoveryService {
    pub fn new(helper: Arc<dyn TestDiscoveryHelper>, scripts: Scripts) -> Self {
        Self { helper, scripts }
    }

    /// One invocation per selected test directory, or a single unscoped one.
    fn discovery_runs(&self, options: &TestDiscoveryOptions) -> Vec<TestDiscoveryOptions> {
        let test_directories = get_test_folders(&options.args);
        let args = self
            .scripts
            .discover_pytest(&prepare_arguments_for_discovery(&DiscoveryArgsOptions {
                args: &options.args,
                workspace_folder: &options.workspace_folder,
                ignore_cache: options.ignore_cache,
            }));

        if test_directories.is_empty() {
            return vec![TestDiscoveryOptions {
                args,
                ..options.clone()
            }];
        }

        test_directories
            .into_iter()
            .map(|dir| {
                let mut scoped = args.clone();
                scoped.push(dir);
                TestDiscoveryOptions {
                    args: scoped,
                    ..options.clone()
                }
            })
            .collect()
    }
}

#[async_trait]
impl TestDiscovery for PytestDiscoveryService {
    async fn discover_workspace_tests(
        &self,
        options: &TestDiscoveryOptions,
    ) -> Result<Option<TestTree>, DiscoveryError> {
        let runs = self.discovery_runs(options);
        debug!(invocations = runs.len(), "Starting pytest discovery");

        let results = join_all(runs.iter().map(|run| self.helper.run_test_discovery(run))).await;

        let mut units = Vec::new();
        for result in results {
            match result {
                Ok(found) => units.extend(found),
                Err(e) if e.is_cancellation() => {
                    info!("pytest discovery cancelled");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        if options.is_cancelled() {
            info!("pytest discovery cancelled");
            return Ok(None);
        }
        Ok(build_pytest_tree(&options.workspace_folder, &units))
    }
}

/// Composes raw units into one workspace tree.
///
/// A single non-empty unit populates the pytest root directly; several get
/// one sub-root each, labeled by the basename of the unit root. Empty units
/// are skipped and a tree with no nodes under the root is `None`.
pub fn build_pytest_tree(workspace_folder: &Path, units: &[RawDiscoveredTests]) -> Option<TestTree> {
    let non_empty: Vec<&RawDiscoveredTests> = units.iter().filter(|u| !u.is_empty()).collect();

    let mut tree = TestTree::new(
        workspace_folder,
        TestNode::workspace_root(PYTEST_ROOT_ID, PYTEST_ROOT_LABEL, workspace_folder),
    );
    let root = tree.root();

    match non_empty.as_slice() {
        [] => return None,
        [unit] => {
            update_test_root(&mut tree, root, unit);
        }
        many => {
            for unit in many {
                let sub_root = tree.add_child(
                    root,
                    TestNode::workspace_root(
                        unit.root.to_string_lossy(),
                        base_name(&unit.root),
                        &unit.root,
                    ),
                );
                update_test_root(&mut tree, sub_root, unit);
            }
        }
    }

    (!tree.is_empty()).then_some(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawParentKind, RawTest, RawTestParent};
    use std::path::PathBuf;

    fn unit(root: &str, tests: &[&str]) -> RawDiscoveredTests {
        RawDiscoveredTests {
            rootid: ".".to_string(),
            root: PathBuf::from(root),
            parents: vec![RawTestParent {
                id: "./test_a.py".to_string(),
                name: "test_a.py".to_string(),
                parentid: ".".to_string(),
                kind: RawParentKind::File,
                relpath: Some("./test_a.py".to_string()),
            }],
            tests: tests
                .iter()
                .map(|name| RawTest {
                    id: format!("./test_a.py::{name}"),
                    name: name.to_string(),
                    parentid: "./test_a.py".to_string(),
                    source: "./test_a.py:1".to_string(),
                    markers: vec![],
                })
                .collect(),
        }
    }

    #[test]
    fn test_single_unit_populates_root() {
        let tree = build_pytest_tree(Path::new("/repo"), &[unit("/repo", &["test_one"])]).unwrap();
        let root = tree.root();
        assert_eq!(tree[root].id, PYTEST_ROOT_ID);
        assert_eq!(tree[root].label, PYTEST_ROOT_LABEL);
        let file = tree.children(root)[0];
        assert_eq!(tree[file].label, "test_a.py");
    }

    #[test]
    fn test_several_units_get_sub_roots() {
        let units = [
            unit("/repo/unit", &["test_one"]),
            unit("/repo/empty", &[]),
            unit("/repo/integration", &["test_two"]),
        ];
        let tree = build_pytest_tree(Path::new("/repo"), &units).unwrap();
        let labels: Vec<&str> = tree
            .children(tree.root())
            .iter()
            .map(|id| tree[*id].label.as_str())
            .collect();
        assert_eq!(labels, vec!["unit", "integration"]);
    }

    #[test]
    fn test_all_empty_is_none() {
        assert!(build_pytest_tree(Path::new("/repo"), &[]).is_none());
        assert!(build_pytest_tree(Path::new("/repo"), &[unit("/repo", &[]), unit("/x", &[])]).is_none());
    }
}
