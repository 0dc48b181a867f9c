//! JUnit XML results, as written by pytest's `--junit-xml`.

use std::borrow::Cow;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::debug;

use crate::run::{TestMessage, TestResultState, TestRun};
use crate::tree::{NodeId, TestTree};

/// JUnit parsing errors.
#[derive(Debug, Error)]
pub enum JunitError {
    #[error("Failed to read results file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JUnit XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid JUnit XML attribute: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("got multiple XML results")]
    MultipleSuites,
}

/// `<failure>`, `<error>` or `<skipped>` detail of a case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JunitDetail {
    pub kind: String,
    pub message: String,
    pub text: String,
}

/// One `<testcase>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JunitCase {
    pub classname: String,
    pub name: String,
    pub error: Option<JunitDetail>,
    pub failure: Option<JunitDetail>,
    pub skipped: Option<JunitDetail>,
}

impl JunitCase {
    /// `classname.name`, the id pytest reports the case under.
    pub fn result_id(&self) -> String {
        format!("{}.{}", self.classname, self.name)
    }

    /// Exact match, or a suffix of `run_id` when pytest dropped a path prefix.
    pub fn matches(&self, run_id: &str) -> bool {
        let result_id = self.result_id();
        run_id == result_id || run_id.ends_with(&result_id)
    }
}

/// One `<testsuite>` with its counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JunitSuite {
    pub tests: i64,
    pub failures: i64,
    pub errors: i64,
    pub skipped: i64,
    pub cases: Vec<JunitCase>,
}

impl JunitSuite {
    pub fn passed(&self) -> i64 {
        self.tests - self.failures - self.skipped - self.errors
    }
}

#[derive(Clone, Copy)]
enum DetailKind {
    Error,
    Failure,
    Skipped,
}

impl DetailKind {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"error" => Some(DetailKind::Error),
            b"failure" => Some(DetailKind::Failure),
            b"skipped" => Some(DetailKind::Skipped),
            _ => None,
        }
    }
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, JunitError> {
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn safe_int(value: Option<String>) -> i64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

fn read_suite(element: &BytesStart<'_>) -> Result<JunitSuite, JunitError> {
    let skipped = match attribute(element, b"skips")? {
        Some(skips) if !skips.is_empty() => Some(skips),
        _ => match attribute(element, b"skip")? {
            Some(skip) => Some(skip),
            None => attribute(element, b"skipped")?,
        },
    };
    Ok(JunitSuite {
        tests: safe_int(attribute(element, b"tests")?),
        failures: safe_int(attribute(element, b"failures")?),
        errors: safe_int(attribute(element, b"errors")?),
        skipped: safe_int(skipped),
        cases: Vec::new(),
    })
}

fn read_case(element: &BytesStart<'_>) -> Result<JunitCase, JunitError> {
    Ok(JunitCase {
        classname: attribute(element, b"classname")?.unwrap_or_default(),
        name: attribute(element, b"name")?.unwrap_or_default(),
        ..JunitCase::default()
    })
}

fn read_detail(element: &BytesStart<'_>) -> Result<JunitDetail, JunitError> {
    Ok(JunitDetail {
        kind: attribute(element, b"type")?.unwrap_or_default(),
        message: attribute(element, b"message")?.unwrap_or_default(),
        text: String::new(),
    })
}

/// Keeps only the first detail of each kind.
fn attach_detail(case: &mut JunitCase, kind: DetailKind, detail: JunitDetail) {
    let slot = match kind {
        DetailKind::Error => &mut case.error,
        DetailKind::Failure => &mut case.failure,
        DetailKind::Skipped => &mut case.skipped,
    };
    slot.get_or_insert(detail);
}

/// Parses a results document into its suite.
///
/// A bare `<testsuite>` root is returned as is. A `<testsuites>` wrapper
/// with no suite yields `None`; more than one nested suite is an error.
pub fn parse_junit_xml(xml: &str) -> Result<Option<JunitSuite>, JunitError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut wrapped = false;
    let mut suites: Vec<JunitSuite> = Vec::new();
    let mut suite: Option<JunitSuite> = None;
    let mut case: Option<JunitCase> = None;
    let mut detail: Option<(DetailKind, JunitDetail)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"testsuites" => wrapped = true,
                b"testsuite" => suite = Some(read_suite(&e)?),
                b"testcase" => case = Some(read_case(&e)?),
                tag => {
                    if let (Some(kind), Some(_)) = (DetailKind::from_tag(tag), &case) {
                        detail = Some((kind, read_detail(&e)?));
                    }
                }
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"testsuites" => wrapped = true,
                b"testsuite" => suites.push(read_suite(&e)?),
                b"testcase" => {
                    if let Some(suite) = suite.as_mut() {
                        suite.cases.push(read_case(&e)?);
                    }
                }
                tag => {
                    if let (Some(kind), Some(case)) = (DetailKind::from_tag(tag), case.as_mut()) {
                        attach_detail(case, kind, read_detail(&e)?);
                    }
                }
            },
            Event::Text(t) => {
                if let Some((_, detail)) = detail.as_mut() {
                    detail.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some((_, detail)) = detail.as_mut() {
                    detail.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"testsuite" => suites.extend(suite.take()),
                b"testcase" => {
                    if let (Some(done), Some(suite)) = (case.take(), suite.as_mut()) {
                        suite.cases.push(done);
                    }
                }
                tag if DetailKind::from_tag(tag).is_some() => {
                    if let (Some((kind, done)), Some(case)) = (detail.take(), case.as_mut()) {
                        attach_detail(case, kind, done);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !wrapped {
        return Ok(suites.into_iter().next());
    }
    match suites.len() {
        0 => Ok(None),
        1 => Ok(suites.pop()),
        _ => Err(JunitError::MultipleSuites),
    }
}

/// Applies a parsed suite to the leaves under `node`.
///
/// Results are looked up per leaf by `run_id`; leaves without a result are
/// reset to [`TestResultState::Unset`] with a "not found" line, results
/// without a leaf are ignored.
pub fn apply_junit_suite(suite: &JunitSuite, tree: &TestTree, node: NodeId, run: &TestRun) {
    let case_nodes = tree.test_case_nodes(node);
    if suite.cases.is_empty() || case_nodes.is_empty() {
        debug!(cases = suite.cases.len(), leaves = case_nodes.len(), "Nothing to reconcile");
        return;
    }

    run.append_output(&format!("Total number of tests passed: {}\r\n", suite.passed()));
    run.append_output(&format!("Total number of tests failed: {}\r\n", suite.failures));
    run.append_output(&format!("Total number of tests failed with errors: {}\r\n", suite.errors));
    run.append_output(&format!("Total number of tests skipped: {}\r\n", suite.skipped));

    for case_node in case_nodes {
        let Some(case) = tree[case_node].as_case() else {
            continue;
        };
        let raw_id = &case.raw.id;

        let Some(result) = suite.cases.iter().find(|r| r.matches(&case.run_id)) else {
            run.append_output(&format!("Test result not found for: {raw_id}\r\n"));
            run.set_state(case_node, TestResultState::Unset);
            continue;
        };

        if let Some(error) = &result.error {
            let text = format!(
                "{raw_id} Failed with Error: [{}]{}\r\n{}\r\n\r\n",
                error.kind, error.message, error.text
            );
            run.set_state(case_node, TestResultState::Errored);
            run.append_output(&text);
            run.append_message(case_node, TestMessage::error(text));
        } else if let Some(failure) = &result.failure {
            let text = format!(
                "{raw_id} Failed: [{}]{}\r\n{}\r\n",
                failure.kind, failure.message, failure.text
            );
            run.set_state(case_node, TestResultState::Failed);
            run.append_output(&text);
            run.append_message(case_node, TestMessage::information(text));
        } else if let Some(skip) = &result.skipped {
            let text = format!("{raw_id} Skipped: [{}]{}\r\n", skip.kind, skip.message);
            run.set_state(case_node, TestResultState::Skipped);
            run.append_output(&text);
        } else {
            run.set_state(case_node, TestResultState::Passed);
            run.append_output(&format!("{raw_id} Passed\r\n"));
        }
    }
}

/// Reads `path` and reconciles it onto the leaves under `node`.
pub async fn update_result_from_junit_xml(
    path: &Path,
    tree: &TestTree,
    node: NodeId,
    run: &TestRun,
) -> Result<(), JunitError> {
    let data = tokio::fs::read(path).await?;
    let xml: Cow<'_, str> = String::from_utf8_lossy(&data);
    if let Some(suite) = parse_junit_xml(&xml)? {
        apply_junit_suite(&suite, tree, node, run);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_suite() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<testsuite errors="1" failures="1" name="pytest" skips="1" tests="4" time="0.03">
  <testcase classname="test_math" name="test_ok" time="0.001"/>
  <testcase classname="test_math" name="test_fail" time="0.001">
    <failure message="assert 1 == 2" type="AssertionError">def test_fail():
&gt;       assert 1 == 2</failure>
  </testcase>
  <testcase classname="test_math" name="test_skip"><skipped type="pytest.skip" message="nope"/></testcase>
  <testcase classname="test_math" name="test_err"><error type="ValueError" message="bad"><![CDATA[trace <here>]]></error></testcase>
</testsuite>"#;
        let suite = parse_junit_xml(xml).unwrap().unwrap();

        assert_eq!((suite.tests, suite.failures, suite.errors, suite.skipped), (4, 1, 1, 1));
        assert_eq!(suite.passed(), 1);
        assert_eq!(suite.cases.len(), 4);
        assert!(suite.cases[0].failure.is_none());

        let failure = suite.cases[1].failure.as_ref().unwrap();
        assert_eq!(failure.kind, "AssertionError");
        assert_eq!(failure.message, "assert 1 == 2");
        assert!(failure.text.contains(">       assert 1 == 2"));

        assert_eq!(suite.cases[2].skipped.as_ref().unwrap().message, "nope");
        assert_eq!(suite.cases[3].error.as_ref().unwrap().text, "trace <here>");
    }

    #[test]
    fn test_skip_counter_fallbacks() {
        let skip = parse_junit_xml(r#"<testsuite tests="2" skip="2"></testsuite>"#).unwrap().unwrap();
        assert_eq!(skip.skipped, 2);
        let skipped = parse_junit_xml(r#"<testsuite tests="2" skipped="1"/>"#).unwrap().unwrap();
        assert_eq!(skipped.skipped, 1);
        let garbage = parse_junit_xml(r#"<testsuite tests="x"/>"#).unwrap().unwrap();
        assert_eq!(garbage.tests, 0);
    }

    #[test]
    fn test_wrapper_with_one_none_or_many_suites() {
        let one = r#"<testsuites><testsuite tests="1"><testcase classname="a" name="b"/></testsuite></testsuites>"#;
        assert_eq!(parse_junit_xml(one).unwrap().unwrap().cases.len(), 1);

        assert_eq!(parse_junit_xml("<testsuites></testsuites>").unwrap(), None);

        let many = r#"<testsuites><testsuite tests="1"/><testsuite tests="1"/></testsuites>"#;
        let err = parse_junit_xml(many).unwrap_err();
        assert!(matches!(err, JunitError::MultipleSuites));
        assert_eq!(err.to_string(), "got multiple XML results");
    }

    #[test]
    fn test_case_matching() {
        let case = JunitCase {
            classname: "test_math".to_string(),
            name: "test_x".to_string(),
            ..JunitCase::default()
        };
        assert!(case.matches("test_math.test_x"));
        assert!(case.matches("tests.test_math.test_x"));
        assert!(!case.matches("test_math.test_x2"));
    }
}
