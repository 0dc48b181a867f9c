use std::collections::{HashMap, VecDeque};

use tracing::debug;

use super::{NodeId, TestCase, TestCollection, TestFile, TestFolder, TestNode, TestTree};
use crate::raw::{RawDiscoveredTests, RawParentKind, RawTestParent};

/// Where a materialized node hangs.
enum Attach {
    Root,
    Parent(usize),
}

/// Populates `root` with the contents of one discovery unit.
///
/// Parents are materialized by kind (unknown kinds are skipped), then every
/// parent and test is attached to the unit root (`parentid == rootid`) or to
/// the first parent with a matching id. Links are resolved against the whole
/// unit, so declaration order does not matter. Entries that never reach the
/// unit root (unresolved `parentid`, cycles) are left out of the tree.
pub fn update_test_root(tree: &mut TestTree, root: NodeId, data: &RawDiscoveredTests) -> NodeId {
    let mut pending: Vec<Option<TestNode>> = Vec::new();
    let mut links: Vec<&str> = Vec::new();
    let mut by_id: HashMap<&str, usize> = HashMap::new();

    for parent in &data.parents {
        let Some(node) = materialize_parent(data, parent) else {
            debug!(id = %parent.id, kind = ?parent.kind, "Unknown test node kind, skipping");
            continue;
        };
        by_id.entry(parent.id.as_str()).or_insert(pending.len());
        links.push(&parent.parentid);
        pending.push(Some(node));
    }

    for test in &data.tests {
        links.push(&test.parentid);
        pending.push(Some(TestCase::create(&data.root, test)));
    }

    let mut root_children = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); pending.len()];
    for (index, parentid) in links.iter().enumerate() {
        let attach = if *parentid == data.rootid {
            Some(Attach::Root)
        } else {
            by_id.get(parentid).map(|p| Attach::Parent(*p))
        };
        match attach {
            Some(Attach::Root) => root_children.push(index),
            Some(Attach::Parent(p)) => children[p].push(index),
            None => debug!(parentid = %parentid, "Unresolved parent id, dropping node"),
        }
    }

    let mut queue: VecDeque<(NodeId, usize)> =
        root_children.into_iter().map(|i| (root, i)).collect();
    while let Some((parent, index)) = queue.pop_front() {
        let Some(node) = pending[index].take() else {
            continue;
        };
        let id = tree.add_child(parent, node);
        queue.extend(children[index].iter().map(|child| (id, *child)));
    }

    root
}

fn materialize_parent(data: &RawDiscoveredTests, parent: &RawTestParent) -> Option<TestNode> {
    match parent.kind {
        RawParentKind::Folder => Some(TestFolder::create(&data.root, parent)),
        RawParentKind::File => Some(TestFile::create(&data.root, parent)),
        RawParentKind::Suite | RawParentKind::Function => {
            Some(TestCollection::create(&data.root, parent))
        }
        RawParentKind::Unknown => None,
    }
}
