use std::path::{Path, PathBuf};

use crate::config::{
    InterpreterConfig, RUN_ADAPTER_SCRIPT, SYMBOL_PROVIDER_SCRIPT, UNITTEST_LAUNCHER_SCRIPT,
};

/// Argument builders for the helper scripts shipped next to the interpreter
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scripts {
    scripts_dir: PathBuf,
}

impl Scripts {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
        }
    }

    pub fn from_config(config: &InterpreterConfig) -> Self {
        Self::new(&config.scripts_dir)
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    fn script(&self, name: &str, args: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut out = vec![self.scripts_dir.join(name).to_string_lossy().into_owned()];
        out.extend(args);
        out
    }

    /// `run_adapter.py <args...>`
    pub fn run_adapter(&self, args: &[String]) -> Vec<String> {
        self.script(RUN_ADAPTER_SCRIPT, args.iter().cloned())
    }

    /// `run_adapter.py discover pytest -- <pytest args...>`
    pub fn discover_pytest(&self, pytest_args: &[String]) -> Vec<String> {
        let adapter_args = ["discover", "pytest", "--"]
            .into_iter()
            .map(String::from)
            .chain(pytest_args.iter().cloned());
        self.script(RUN_ADAPTER_SCRIPT, adapter_args)
    }

    /// `visualstudio_py_testlauncher.py <args...>`
    pub fn testlauncher(&self, args: &[String]) -> Vec<String> {
        self.script(UNITTEST_LAUNCHER_SCRIPT, args.iter().cloned())
    }

    /// `symbolProvider.py <file>`
    pub fn symbol_provider(&self, file: &Path) -> Vec<String> {
        self.script(
            SYMBOL_PROVIDER_SCRIPT,
            [file.to_string_lossy().into_owned()],
        )
    }
}

/// `-c <code>`
pub fn exec_code(code: &str) -> Vec<String> {
    vec!["-c".to_string(), code.to_string()]
}

/// `-m pytest <args...>`
pub fn pytest_module(args: &[String]) -> Vec<String> {
    let mut out = vec!["-m".to_string(), "pytest".to_string()];
    out.extend(args.iter().cloned());
    out
}
