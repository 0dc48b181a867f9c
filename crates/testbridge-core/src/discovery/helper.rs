use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{DiscoveryError, TestDiscoveryOptions};
use crate::process::PythonExecutionService;
use crate::raw::RawDiscoveredTests;

/// Runs one discovery adapter invocation and returns its raw units.
#[async_trait]
pub trait TestDiscoveryHelper: Send + Sync {
    async fn run_test_discovery(
        &self,
        options: &TestDiscoveryOptions,
    ) -> Result<Vec<RawDiscoveredTests>, DiscoveryError>;
}

/// Executes `options.args` with the interpreter and parses stdout as JSON.
///
/// Any stderr output fails the invocation.
#[derive(Clone)]
pub struct PythonDiscoveryHelper {
    exec: Arc<dyn PythonExecutionService>,
}

impl PythonDiscoveryHelper {
    pub fn new(exec: Arc<dyn PythonExecutionService>) -> Self {
        Self { exec }
    }
}

#[async_trait]
impl TestDiscoveryHelper for PythonDiscoveryHelper {
    async fn run_test_discovery(
        &self,
        options: &TestDiscoveryOptions,
    ) -> Result<Vec<RawDiscoveredTests>, DiscoveryError> {
        let exec_options = options.exec_options().throw_on_stderr();
        let output = self.exec.exec(&options.args, &exec_options).await?;
        let units: Vec<RawDiscoveredTests> = serde_json::from_str(&output.stdout)?;
        debug!(units = units.len(), "Parsed discovery output");
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ExecOptions, ExecutionResult, ProcessError};
    use std::sync::Mutex;

    struct CannedExec {
        stdout: String,
        seen: Mutex<Vec<(Vec<String>, bool)>>,
    }

    #[async_trait]
    impl PythonExecutionService for CannedExec {
        async fn exec(
            &self,
            args: &[String],
            options: &ExecOptions,
        ) -> Result<ExecutionResult, ProcessError> {
            self.seen
                .lock()
                .unwrap()
                .push((args.to_vec(), options.throw_on_stderr));
            Ok(ExecutionResult::from_stdout(self.stdout.clone()))
        }
    }

    fn options() -> TestDiscoveryOptions {
        TestDiscoveryOptions::new(
            "/repo",
            "/repo",
            vec!["--some".to_string(), "--args".to_string()],
        )
    }

    #[tokio::test]
    async fn test_returns_parsed_json() {
        let exec = Arc::new(CannedExec {
            stdout: r#"[{"rootid": ".", "root": "/repo/tests", "parents": [], "tests": [
                {"id": "./test_math.py::test_one", "name": "test_one", "source": "./test_math.py:22", "markers": [], "parentid": "./test_math.py"}
            ]}]"#
                .to_string(),
            seen: Mutex::new(vec![]),
        });
        let helper = PythonDiscoveryHelper::new(exec.clone());

        let units = helper.run_test_discovery(&options()).await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].tests[0].name, "test_one");

        let seen = exec.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, vec!["--some", "--args"]);
        assert!(seen[0].1, "discovery must fail on stderr output");
    }

    #[tokio::test]
    async fn test_bad_json_is_an_error() {
        let helper = PythonDiscoveryHelper::new(Arc::new(CannedExec {
            stdout: "[{]".to_string(),
            seen: Mutex::new(vec![]),
        }));

        let result = helper.run_test_discovery(&options()).await;
        assert!(matches!(result, Err(DiscoveryError::InvalidOutput(_))));
    }
}
