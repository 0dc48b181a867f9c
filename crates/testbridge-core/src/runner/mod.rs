//! Runner-specific execution of a run request.

mod pytest;
mod unittest;

pub use pytest::PytestRunner;
pub use unittest::UnittestRunner;

use async_trait::async_trait;

use crate::run::{TestRun, TestRunOptions, TestRunRequest};
use crate::tree::TestTree;

/// Runs a request against a discovered tree, reporting into `run`.
///
/// Implementations always end `run`, whatever happens.
#[async_trait]
pub trait TestsRunner: Send + Sync {
    async fn run_tests(
        &self,
        tree: &TestTree,
        request: &TestRunRequest,
        options: TestRunOptions,
        run: &TestRun,
    );
}
