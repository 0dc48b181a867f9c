//! Configuration management for Testbridge.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Workspace-local `testbridge.toml` file
//! 3. User config `~/.config/testbridge/config.toml`
//! 4. Built-in defaults (lowest priority)
//!
//! Settings are read fresh on every discovery and run call; nothing here
//! caches a loaded [`Config`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod defaults;

pub use defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Test runner configuration.
    pub testing: TestingConfig,

    /// Python interpreter configuration.
    pub interpreter: InterpreterConfig,
}

impl Config {
    /// Load configuration for a workspace folder.
    ///
    /// Searches for config in order:
    /// 1. `<workspace>/testbridge.toml`
    /// 2. `~/.config/testbridge/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load(workspace: &Path) -> Result<Self, ConfigError> {
        let local = workspace.join(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(DEFAULT_USER_CONFIG_DIR).join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(python) = std::env::var("TESTBRIDGE_PYTHON") {
            self.interpreter.python_path = python;
        }
        if let Ok(dir) = std::env::var("TESTBRIDGE_SCRIPTS_DIR") {
            self.interpreter.scripts_dir = dir;
        }
        if let Ok(cwd) = std::env::var("TESTBRIDGE_TESTING_CWD") {
            self.testing.cwd = Some(cwd);
        }
        if let Ok(runner) = std::env::var("TESTBRIDGE_RUNNER") {
            match runner.as_str() {
                PYTEST_PROVIDER => {
                    self.testing.pytest_enabled = true;
                    self.testing.unittest_enabled = false;
                }
                UNITTEST_PROVIDER => {
                    self.testing.pytest_enabled = false;
                    self.testing.unittest_enabled = true;
                }
                _ => {}
            }
        }
        if let Ok(timeout) = std::env::var("TESTBRIDGE_RESULT_TIMEOUT_MS") {
            if let Ok(n) = timeout.parse() {
                self.testing.result_timeout_ms = n;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interpreter.python_path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "interpreter.python_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders this configuration as `testbridge.toml` content.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        Config::default().to_toml().unwrap_or_default()
    }
}

/// Test runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestingConfig {
    /// Whether pytest is the active runner.
    pub pytest_enabled: bool,

    /// Whether unittest is the active runner (consulted only when pytest is disabled).
    pub unittest_enabled: bool,

    /// Working directory override for discovery and runs.
    pub cwd: Option<String>,

    /// Extra arguments passed to pytest.
    pub pytest_args: Vec<String>,

    /// Extra arguments passed to unittest.
    pub unittest_args: Vec<String>,

    /// How long to wait for a streamed unittest result after the launcher exits.
    pub result_timeout_ms: u64,
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            pytest_enabled: DEFAULT_PYTEST_ENABLED,
            unittest_enabled: DEFAULT_UNITTEST_ENABLED,
            cwd: None,
            pytest_args: Vec::new(),
            unittest_args: Vec::new(),
            result_timeout_ms: DEFAULT_RESULT_TIMEOUT_MS,
        }
    }
}

impl TestingConfig {
    /// Working directory for a workspace, honouring the `cwd` override.
    pub fn cwd_or(&self, workspace: &Path) -> PathBuf {
        match &self.cwd {
            Some(cwd) if Path::new(cwd).is_absolute() => PathBuf::from(cwd),
            Some(cwd) => workspace.join(cwd),
            None => workspace.to_path_buf(),
        }
    }

    /// Result grace period as a [`Duration`].
    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }
}

/// Python interpreter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Interpreter executable.
    pub python_path: String,

    /// Directory holding the helper scripts.
    pub scripts_dir: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            python_path: DEFAULT_PYTHON_PATH.to_string(),
            scripts_dir: DEFAULT_SCRIPTS_DIR.to_string(),
        }
    }
}

/// Accessor for per-workspace settings.
///
/// Implementations must not cache: every call reflects the configuration
/// state at call time.
pub trait ConfigurationService: Send + Sync {
    /// Returns the settings that apply to `resource` (a workspace folder).
    fn settings(&self, resource: &Path) -> Result<Config, ConfigError>;
}

/// Reads `testbridge.toml` from the workspace on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkspaceConfiguration;

impl ConfigurationService for WorkspaceConfiguration {
    fn settings(&self, resource: &Path) -> Result<Config, ConfigError> {
        Config::load(resource)
    }
}

/// A fixed configuration, useful when embedding or testing.
impl ConfigurationService for Config {
    fn settings(&self, _resource: &Path) -> Result<Config, ConfigError> {
        Ok(self.clone())
    }
}
