//! Typed node payloads and their construction from raw records.

use std::path::{Component, Path, PathBuf};

use super::{Position, Range, TestData, TestNode};
use crate::raw::{RawTest, RawTestParent};

/// A folder in the test tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TestFolder {
    pub raw: RawTestParent,
}

impl TestFolder {
    pub fn create(test_root: &Path, raw: &RawTestParent) -> TestNode {
        let full_path = join_normalized(test_root, raw.relpath_or_id());
        TestNode::new(
            full_path.to_string_lossy(),
            base_name(&full_path),
            TestData::Folder(Self { raw: raw.clone() }),
        )
        .with_uri(full_path)
        .debuggable()
    }
}

/// A test module.
#[derive(Debug, Clone, PartialEq)]
pub struct TestFile {
    pub raw: RawTestParent,
}

impl TestFile {
    pub fn create(test_root: &Path, raw: &RawTestParent) -> TestNode {
        let full_path = join_normalized(test_root, raw.relpath_or_id());
        TestNode::new(
            full_path.to_string_lossy(),
            base_name(&full_path),
            TestData::File(Self { raw: raw.clone() }),
        )
        .with_uri(full_path)
        .debuggable()
    }
}

/// A suite (class) or a parameterized function grouping generated cases.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCollection {
    pub raw: RawTestParent,
}

impl TestCollection {
    pub fn create(test_root: &Path, raw: &RawTestParent) -> TestNode {
        let full_path = join_normalized(test_root, &raw.id);
        TestNode::new(
            full_path.to_string_lossy(),
            raw.name.clone(),
            TestData::Collection(Self { raw: raw.clone() }),
        )
        .debuggable()
    }
}

/// A leaf test.
///
/// `run_id` is the string the runner echoes back for this test. It is kept
/// apart from the node's tree identity: results are matched on `run_id`
/// only.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub raw: RawTest,
    pub run_id: String,
}

impl TestCase {
    pub fn create(test_root: &Path, raw: &RawTest) -> TestNode {
        // e.g. /root/test_something.py::SomeClass::someTest[x1]
        let full_id = join_normalized(test_root, &raw.id);
        let document = join_normalized(test_root, raw.source_file());

        let mut node = TestNode::new(
            full_id.to_string_lossy(),
            raw.name.clone(),
            TestData::Case(Self {
                raw: raw.clone(),
                run_id: to_run_id(&raw.id),
            }),
        )
        .with_uri(document)
        .debuggable();

        // Raw lines start at 1, tree positions at 0.
        if let Some(line) = raw.source_line() {
            node = node.with_range(Range::new(
                Position::new(line.saturating_sub(1), 0),
                Position::new(line, 0),
            ));
        }

        node
    }
}

/// Translates a raw test id into the id the runner reports results under.
///
/// `./tests/test_math.py::TestMath::test_x` becomes
/// `tests.test_math.TestMath.test_x`: path separators and `::` turn into
/// `.`, runs of `.` collapse, a `.py` ending a path component is dropped.
/// Directories named `py` are kept. Applying it to its own output is a no-op.
pub fn to_run_id(raw_id: &str) -> String {
    let mut run_id = raw_id
        .split(['\\', '/', ':'])
        .map(|component| component.strip_suffix(".py").unwrap_or(component))
        .flat_map(|component| component.split('.'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".");
    // The output has no separators left, so only its end can still carry `.py`.
    while let Some(stripped) = run_id.strip_suffix(".py") {
        run_id.truncate(stripped.len());
    }
    run_id
}

/// Joins `rel` onto `root`, resolving `.` and `..` lexically.
pub(crate) fn join_normalized(root: &Path, rel: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for component in Path::new(rel).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
