pub mod args;
pub mod cancel;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod location;
pub mod process;
pub mod raw;
pub mod results;
pub mod run;
pub mod runner;
pub mod tree;

pub use cancel::CancellationToken;
pub use config::{Config, ConfigError, ConfigurationService, WorkspaceConfiguration};
pub use controller::{
    ControllerError, PytestController, PythonTestController, TestController, UnittestController,
};
pub use location::TestRangeProvider;
pub use raw::RawDiscoveredTests;
pub use run::{RunEvent, TestResultState, TestRun, TestRunRequest};
pub use tree::{NodeId, TestNode, TestTree};
