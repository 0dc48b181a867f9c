//! Source ranges of test definitions, from the symbol provider script.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::error;

use crate::cancel::CancellationToken;
use crate::process::{ExecOptions, ProcessError, PythonExecutionService, Scripts};
use crate::tree::Range;

/// One `{namespace, name, range}` entry; the namespace is not needed.
#[derive(Debug, Clone, Deserialize)]
struct RawSymbol {
    name: String,
    range: Range,
}

/// Looks up where named tests are defined in a file.
#[derive(Clone)]
pub struct TestRangeProvider {
    exec: Arc<dyn PythonExecutionService>,
    scripts: Scripts,
}

impl TestRangeProvider {
    pub fn new(exec: Arc<dyn PythonExecutionService>, scripts: Scripts) -> Self {
        Self { exec, scripts }
    }

    /// One entry per name: the range of the first symbol with that name.
    ///
    /// Unparseable provider output is logged and treated as no symbols.
    pub async fn get_range(
        &self,
        test_file: &Path,
        test_names: &[String],
        token: Option<&CancellationToken>,
    ) -> Result<Vec<Option<Range>>, ProcessError> {
        let symbols = self.symbols(test_file, token).await?;
        Ok(test_names
            .iter()
            .map(|name| {
                symbols
                    .iter()
                    .find(|symbol| &symbol.name == name)
                    .map(|symbol| symbol.range)
            })
            .collect())
    }

    async fn symbols(
        &self,
        test_file: &Path,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<RawSymbol>, ProcessError> {
        let mut options = ExecOptions::default().with_token(token.cloned()).throw_on_stderr();
        options.cwd = test_file.parent().map(Path::to_path_buf);

        let output = self
            .exec
            .exec(&self.scripts.symbol_provider(test_file), &options)
            .await?;
        match serde_json::from_str(&output.stdout) {
            Ok(symbols) => Ok(symbols),
            Err(e) => {
                error!(error = %e, file = %test_file.display(), "Test Location [error]");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ExecutionResult;
    use crate::tree::Position;
    use async_trait::async_trait;

    struct CannedExec(&'static str);

    #[async_trait]
    impl PythonExecutionService for CannedExec {
        async fn exec(
            &self,
            _args: &[String],
            _options: &ExecOptions,
        ) -> Result<ExecutionResult, ProcessError> {
            Ok(ExecutionResult::from_stdout(self.0))
        }
    }

    const SYMBOLS: &str = r#"[{"namespace": "", "name": "test_numbers", "range": {"start": {"line": 4, "character": 0}, "end": {"line": 5, "character": 4}}}, {"namespace": "", "name": "StringTest", "range": {"start": {"line": 18, "character": 0}, "end": {"line": 24, "character": 8}}}, {"namespace": "StringTest", "name": "test_str", "range": {"start": {"line": 19, "character": 4}, "end": {"line": 20, "character": 8}}}]"#;

    fn names() -> Vec<String> {
        ["test_numbers", "test_str", "test_does_not_exist"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_function_location() {
        let provider = TestRangeProvider::new(Arc::new(CannedExec(SYMBOLS)), Scripts::new("/ext"));
        let ranges = provider
            .get_range(Path::new("/repo/test_location.py"), &names(), None)
            .await
            .unwrap();
        assert_eq!(
            ranges,
            vec![
                Some(Range::new(Position::new(4, 0), Position::new(5, 4))),
                Some(Range::new(Position::new(19, 4), Position::new(20, 8))),
                None,
            ]
        );
    }

    #[tokio::test]
    async fn test_parse_error_yields_no_ranges() {
        let provider = TestRangeProvider::new(Arc::new(CannedExec("[{]")), Scripts::new("/ext"));
        let ranges = provider
            .get_range(Path::new("/repo/test_location.py"), &names(), None)
            .await
            .unwrap();
        assert_eq!(ranges, vec![None, None, None]);
    }
}
