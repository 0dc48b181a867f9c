//! Result reconciliation: how run results get back onto tree leaves.
//!
//! pytest writes a JUnit XML file that is parsed after the process exits;
//! the unittest launcher streams one result per case over a local socket.

mod junit;
mod server;

pub use junit::{
    apply_junit_suite, parse_junit_xml, update_result_from_junit_xml, JunitCase, JunitDetail,
    JunitError, JunitSuite,
};
pub use server::{ResultServer, ServerError, ServerEvent, TestResultData};
