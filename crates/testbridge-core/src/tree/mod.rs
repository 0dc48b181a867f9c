//! In-memory test tree.
//!
//! The tree is an arena of [`TestNode`]s addressed by [`NodeId`]. It is built
//! once per discovery pass and replaced wholesale on the next one; nodes are
//! only ever added attached to an existing parent, so everything in the arena
//! is reachable from the root.

mod builder;
mod items;

pub use builder::update_test_root;
pub use items::{to_run_id, TestCase, TestCollection, TestFile, TestFolder};
pub(crate) use items::{base_name, join_normalized};

use std::collections::VecDeque;
use std::ops::Index;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Handle of a node inside one [`TestTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Zero-based line/character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Source range of a test definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// Typed payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum TestData {
    /// Workspace-level (or per-unit) root.
    WorkspaceRoot,
    Folder(TestFolder),
    File(TestFile),
    /// Suite or parameterized function.
    Collection(TestCollection),
    Case(TestCase),
}

/// A node in the test tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TestNode {
    /// Tree identity, derived from the discovery root and the raw id.
    pub id: String,
    pub label: String,
    pub uri: Option<PathBuf>,
    pub range: Option<Range>,
    pub debuggable: bool,
    pub data: TestData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl TestNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>, data: TestData) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            uri: None,
            range: None,
            debuggable: false,
            data,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Creates a workspace root node.
    pub fn workspace_root(
        id: impl Into<String>,
        label: impl Into<String>,
        uri: impl Into<PathBuf>,
    ) -> Self {
        Self::new(id, label, TestData::WorkspaceRoot).with_uri(uri)
    }

    pub fn with_uri(mut self, uri: impl Into<PathBuf>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_range(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }

    pub fn debuggable(mut self) -> Self {
        self.debuggable = true;
        self
    }

    /// Raw id of the record this node was built from.
    pub fn raw_id(&self) -> Option<&str> {
        match &self.data {
            TestData::WorkspaceRoot => None,
            TestData::Folder(folder) => Some(&folder.raw.id),
            TestData::File(file) => Some(&file.raw.id),
            TestData::Collection(collection) => Some(&collection.raw.id),
            TestData::Case(case) => Some(&case.raw.id),
        }
    }

    pub fn as_case(&self) -> Option<&TestCase> {
        match &self.data {
            TestData::Case(case) => Some(case),
            _ => None,
        }
    }

    pub fn is_workspace_root(&self) -> bool {
        matches!(self.data, TestData::WorkspaceRoot)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Arena holding one discovered tree.
#[derive(Debug, Clone)]
pub struct TestTree {
    workspace_folder: PathBuf,
    nodes: Vec<TestNode>,
}

impl TestTree {
    /// Creates a tree for `workspace_folder` with the given root node.
    pub fn new(workspace_folder: impl Into<PathBuf>, mut root: TestNode) -> Self {
        root.parent = None;
        root.children.clear();
        Self {
            workspace_folder: workspace_folder.into(),
            nodes: vec![root],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn workspace_folder(&self) -> &Path {
        &self.workspace_folder
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn get(&self, id: NodeId) -> Option<&TestNode> {
        self.nodes.get(id.0)
    }

    /// Attaches `node` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, mut node: TestNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self[id].children
    }

    /// Looks a node up by its tree identity.
    pub fn find(&self, item_id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.id == item_id)
            .map(NodeId)
    }

    /// `id` and all of its descendants, breadth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(next) = queue.pop_front() {
            out.push(next);
            queue.extend(self[next].children.iter().copied());
        }
        out
    }

    /// The leaf cases under `id` (or `id` itself when it is a case).
    pub fn test_case_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|n| self[*n].as_case().is_some())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TestNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }
}

impl Index<NodeId> for TestTree {
    type Output = TestNode;

    fn index(&self, id: NodeId) -> &TestNode {
        &self.nodes[id.0]
    }
}
