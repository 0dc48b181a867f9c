//! Raw discovery model: the wire format produced by the discovery back-ends.
//!
//! A discovery invocation yields one [`RawDiscoveredTests`] unit: a flat list
//! of parents (folder/file/suite/function) plus leaf tests, linked by
//! `parentid`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Common shape of every discovered entity.
pub trait RawTestNode {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn parentid(&self) -> &str;
}

/// Kind of a container node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawParentKind {
    Folder,
    File,
    Suite,
    /// A parameterized test acting as a container for its generated cases.
    Function,
    /// Anything the back-end emits that we do not understand.
    #[serde(other)]
    Unknown,
}

impl RawParentKind {
    /// Folder and file parents carry a `relpath`.
    pub fn is_fs(&self) -> bool {
        matches!(self, RawParentKind::Folder | RawParentKind::File)
    }
}

/// A container node: folder, file, suite or parameterized function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTestParent {
    pub id: String,
    pub name: String,
    pub parentid: String,
    pub kind: RawParentKind,
    /// Path relative to the discovery root (folder and file only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relpath: Option<String>,
}

impl RawTestParent {
    /// Relative path of a folder/file parent, falling back to its id.
    pub fn relpath_or_id(&self) -> &str {
        self.relpath.as_deref().unwrap_or(&self.id)
    }
}

impl RawTestNode for RawTestParent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parentid(&self) -> &str {
        &self.parentid
    }
}

/// A leaf test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTest {
    pub id: String,
    pub name: String,
    pub parentid: String,
    /// `"<relative-file>:<line-number>"`.
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<String>,
}

impl RawTest {
    /// Relative file part of `source`.
    pub fn source_file(&self) -> &str {
        match self.source.split_once(':') {
            Some((file, _)) => file,
            None => &self.source,
        }
    }

    /// 1-based line number part of `source`, if present and numeric.
    pub fn source_line(&self) -> Option<u32> {
        let (_, line) = self.source.split_once(':')?;
        line.trim().parse().ok()
    }
}

impl RawTestNode for RawTest {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn parentid(&self) -> &str {
        &self.parentid
    }
}

/// One discovery invocation's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDiscoveredTests {
    /// Id that top-level parents point at.
    pub rootid: String,
    /// Absolute path of the discovery root.
    pub root: PathBuf,
    pub parents: Vec<RawTestParent>,
    pub tests: Vec<RawTest>,
}

impl RawDiscoveredTests {
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_adapter_output() {
        let json = r#"[{
            "rootid": ".",
            "root": "/repo/tests",
            "parents": [
                {"id": "./test_math.py", "kind": "file", "name": "test_math.py", "parentid": ".", "relpath": "./test_math.py"},
                {"id": "./test_math.py::test_numbers2", "kind": "function", "name": "test_numbers2", "parentid": "./test_math.py"},
                {"id": "./x", "kind": "package", "name": "x", "parentid": "."}
            ],
            "tests": [
                {"id": "./test_math.py::test_numbers2[x0]", "name": "test_numbers2[x0]", "source": "./test_math.py:8", "markers": ["skip"], "parentid": "./test_math.py::test_numbers2"}
            ]
        }]"#;

        let units: Vec<RawDiscoveredTests> = serde_json::from_str(json).unwrap();
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert_eq!(unit.parents[0].kind, RawParentKind::File);
        assert_eq!(unit.parents[0].relpath.as_deref(), Some("./test_math.py"));
        assert_eq!(unit.parents[1].kind, RawParentKind::Function);
        assert_eq!(unit.parents[1].relpath, None);
        assert_eq!(unit.parents[2].kind, RawParentKind::Unknown);
        assert_eq!(unit.tests[0].markers, vec!["skip"]);
    }

    #[test]
    fn test_source_location() {
        let test = RawTest {
            id: "./test_math.py::test_x".to_string(),
            name: "test_x".to_string(),
            parentid: "./test_math.py".to_string(),
            source: "./test_math.py:4".to_string(),
            markers: vec![],
        };
        assert_eq!(test.source_file(), "./test_math.py");
        assert_eq!(test.source_line(), Some(4));

        let no_line = RawTest {
            source: "./test_math.py".to_string(),
            ..test
        };
        assert_eq!(no_line.source_file(), "./test_math.py");
        assert_eq!(no_line.source_line(), None);
    }
}
