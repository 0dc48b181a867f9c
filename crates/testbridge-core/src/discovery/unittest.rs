use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{DiscoveryError, TestDiscovery, TestDiscoveryOptions};
use crate::args::unittest::{get_test_folders, get_test_pattern};
use crate::cancel::CancellationToken;
use crate::config::DEFAULT_UNITTEST_START_DIR;
use crate::process::{exec_code, ProcessError, PythonExecutionService};
use crate::raw::{RawDiscoveredTests, RawParentKind, RawTest, RawTestParent};
use crate::tree::{base_name, join_normalized, update_test_root, TestNode, TestTree};

/// Line printed by the discovery program before any test line.
const START_SENTINEL: &str = "start";

/// Discovery by running a small program that walks `unittest`'s loader.
#[derive(Clone)]
pub struct UnittestDiscoveryService {
    exec: Arc<dyn PythonExecutionService>,
}

impl UnittestDiscoveryService {
    pub fn new(exec: Arc<dyn PythonExecutionService>) -> Self {
        Self { exec }
    }
}

#[async_trait]
impl TestDiscovery for UnittestDiscoveryService {
    async fn discover_workspace_tests(
        &self,
        options: &TestDiscoveryOptions,
    ) -> Result<Option<TestTree>, DiscoveryError> {
        let start_dir = get_test_folders(&options.args)
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_UNITTEST_START_DIR.to_string());
        let pattern = get_test_pattern(&options.args);
        let script = discovery_script(&start_dir, &pattern);

        // Loading test modules needs the workspace on the path, so the
        // program runs from `cwd` rather than isolated.
        let output = match self
            .exec
            .exec(&exec_code(&script), &options.exec_options())
            .await
        {
            Err(ProcessError::Cancelled) => {
                info!("unittest discovery cancelled");
                return Ok(None);
            }
            result => result?,
        };

        let test_dir = relative_test_dir(&options.cwd, &start_dir);
        let raw = parse_test_ids(
            &options.cwd,
            &test_dir,
            &get_test_ids(&output.stdout),
            options.token.as_ref(),
        );
        if raw.is_empty() {
            return Ok(None);
        }

        let mut tree = TestTree::new(
            &options.workspace_folder,
            TestNode::workspace_root(
                raw.root.to_string_lossy(),
                base_name(&raw.root),
                &options.workspace_folder,
            ),
        );
        let root = tree.root();
        update_test_root(&mut tree, root, &raw);
        Ok(Some(tree))
    }
}

/// The program that prints `module:Class:method:line` for every test.
pub fn discovery_script(start_dir: &str, pattern: &str) -> String {
    format!(
        r#"
import unittest
import inspect
loader = unittest.TestLoader()
suites = loader.discover({start_dir}, pattern={pattern})
def get_sourceline(obj):
    s, n = inspect.getsourcelines(obj)
    for i, v in enumerate(s):
        if v.strip().startswith('def'):
            return str(n+i)
    return '*'
print("{START_SENTINEL}")
for suite in suites._tests:
    for cls in suite._tests:
        try:
            for m in cls._tests:
                tm = getattr(m, m._testMethodName)
                print(m.id().replace('.',':') + ":" + get_sourceline(tm))
        except:
            pass
"#,
        start_dir = python_string(start_dir),
        pattern = python_string(pattern),
    )
}

/// A double-quoted literal; JSON string escapes are valid Python escapes.
fn python_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

fn relative_test_dir(cwd: &Path, start_dir: &str) -> String {
    let path = Path::new(start_dir);
    if !path.is_absolute() {
        return start_dir.to_string();
    }
    match path.strip_prefix(cwd) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.to_string_lossy().into_owned(),
        Err(_) => start_dir.to_string(),
    }
}

/// Data lines of the discovery program's output.
///
/// Everything up to and including the sentinel line is noise.
pub fn get_test_ids(content: &str) -> Vec<String> {
    content
        .lines()
        .skip_while(|line| *line != START_SENTINEL)
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Synthesizes a raw unit from `module:Class:method:line` lines.
///
/// Folder, file, suite and test records are produced with `./`-prefixed
/// ids linked the way the pytest adapter links them. Lines with fewer than
/// four fields are skipped.
pub fn parse_test_ids(
    cwd: &Path,
    test_dir: &str,
    test_ids: &[String],
    token: Option<&CancellationToken>,
) -> RawDiscoveredTests {
    let mut parents: Vec<RawTestParent> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut tests: Vec<RawTest> = Vec::new();

    let mut add_parent = |parent: RawTestParent| {
        if seen.insert(parent.id.clone()) {
            parents.push(parent);
        }
    };

    for test_id in test_ids {
        if token.is_some_and(CancellationToken::is_cancelled) {
            debug!("unittest discovery parsing cancelled");
            break;
        }

        let mut parts: Vec<&str> = test_id.split(':').collect();
        if parts.len() <= 3 {
            debug!(line = %test_id, "Skipping malformed discovery line");
            continue;
        }
        let (Some(line), Some(function), Some(class), Some(module)) =
            (parts.pop(), parts.pop(), parts.pop(), parts.pop())
        else {
            continue;
        };
        let folders = parts;

        let py_file = format!("{module}.py");
        let rel_path = format!(
            "./{}",
            folders
                .iter()
                .copied()
                .chain([py_file.as_str()])
                .collect::<Vec<_>>()
                .join("/")
        );
        let collection_id = format!("{rel_path}::{class}");

        tests.push(RawTest {
            id: format!("{collection_id}::{function}"),
            name: function.to_string(),
            parentid: collection_id.clone(),
            source: format!("{rel_path}:{line}"),
            markers: Vec::new(),
        });

        add_parent(RawTestParent {
            id: collection_id,
            name: class.to_string(),
            parentid: rel_path.clone(),
            kind: RawParentKind::Suite,
            relpath: None,
        });

        add_parent(RawTestParent {
            id: rel_path.clone(),
            name: py_file,
            parentid: if folders.is_empty() {
                test_dir.to_string()
            } else {
                format!("./{}", folders.join("/"))
            },
            kind: RawParentKind::File,
            relpath: Some(rel_path),
        });

        let mut folder_path = String::from(".");
        for folder in &folders {
            let parentid = if folder_path == "." {
                test_dir.to_string()
            } else {
                folder_path.clone()
            };
            folder_path = format!("{folder_path}/{folder}");
            add_parent(RawTestParent {
                id: folder_path.clone(),
                name: folder.to_string(),
                parentid,
                kind: RawParentKind::Folder,
                relpath: Some(folder_path.clone()),
            });
        }
    }

    let root = if Path::new(test_dir).is_absolute() {
        PathBuf::from(test_dir)
    } else {
        join_normalized(cwd, test_dir)
    };

    RawDiscoveredTests {
        rootid: test_dir.to_string(),
        root,
        parents,
        tests,
    }
}
