//! Default values for Testbridge configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Config File Defaults
// ============================================================================

/// Name of the per-workspace configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "testbridge.toml";

/// Directory under the user config dir holding `config.toml`.
pub const DEFAULT_USER_CONFIG_DIR: &str = "testbridge";

// ============================================================================
// Testing Defaults
// ============================================================================

/// Pytest is the default runner.
pub const DEFAULT_PYTEST_ENABLED: bool = true;

/// Unittest is only consulted when pytest is disabled.
pub const DEFAULT_UNITTEST_ENABLED: bool = false;

/// Grace period for a streamed unittest result after the launcher exits (5 s).
pub const DEFAULT_RESULT_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// Interpreter Defaults
// ============================================================================

/// Interpreter used to launch the runners.
#[cfg(windows)]
pub const DEFAULT_PYTHON_PATH: &str = "python";

/// Interpreter used to launch the runners.
#[cfg(not(windows))]
pub const DEFAULT_PYTHON_PATH: &str = "python3";

/// Directory holding the helper scripts.
pub const DEFAULT_SCRIPTS_DIR: &str = "pythonFiles";

// ============================================================================
// Helper Scripts
// ============================================================================

/// Discovery adapter, relative to the scripts directory.
pub const RUN_ADAPTER_SCRIPT: &str = "testing_tools/run_adapter.py";

/// Unittest launcher that reports results over the result socket.
pub const UNITTEST_LAUNCHER_SCRIPT: &str = "visualstudio_py_testlauncher.py";

/// Symbol provider used to locate test definitions.
pub const SYMBOL_PROVIDER_SCRIPT: &str = "symbolProvider.py";

// ============================================================================
// Runner Constants
// ============================================================================

/// Provider name for pytest.
pub const PYTEST_PROVIDER: &str = "pytest";

/// Provider name for unittest.
pub const UNITTEST_PROVIDER: &str = "unittest";

/// Id of the synthetic pytest workspace root.
pub const PYTEST_ROOT_ID: &str = "pytest";

/// Label of the synthetic pytest workspace root.
pub const PYTEST_ROOT_LABEL: &str = "Pytest Tests";

/// Default unittest discovery pattern.
pub const DEFAULT_UNITTEST_PATTERN: &str = "test*.py";

/// Default unittest start directory.
pub const DEFAULT_UNITTEST_START_DIR: &str = ".";
