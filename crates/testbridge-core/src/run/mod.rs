//! Test runs: the run record hosts observe, and the orchestration that walks
//! a request over the tree.

mod helper;

pub use helper::{dispatch, process_test_node, run_requested_nodes, RunTestFunction};

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::process::ProcessError;
use crate::results::{JunitError, ServerError};
use crate::tree::NodeId;

/// Run errors.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Junit(#[from] JunitError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Failed to prepare results file: {0}")]
    Io(#[from] std::io::Error),

    #[error("No result received for {0}")]
    NoResult(String),

    #[error("Result server reported an error: {0}")]
    Protocol(String),
}

/// State of a leaf within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResultState {
    Unset,
    Running,
    Passed,
    Failed,
    Errored,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSeverity {
    Error,
    Information,
}

/// A message attached to one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl TestMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: MessageSeverity::Error,
        }
    }

    pub fn information(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: MessageSeverity::Information,
        }
    }
}

/// Events streamed to the host while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Output(String),
    State { node: NodeId, state: TestResultState },
    Message { node: NodeId, message: TestMessage },
    Ended,
}

/// Leaf states counted across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
    pub unset: usize,
    pub running: usize,
}

#[derive(Debug, Default)]
struct RunState {
    ended_at: Option<DateTime<Utc>>,
    states: HashMap<NodeId, TestResultState>,
    messages: HashMap<NodeId, Vec<TestMessage>>,
    output: String,
}

/// The host-visible record of one run.
///
/// Once [`end`](Self::end) is called the record is frozen: later output,
/// state and message updates are ignored.
#[derive(Debug)]
pub struct TestRun {
    id: String,
    started_at: DateTime<Utc>,
    state: Mutex<RunState>,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl TestRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            state: Mutex::new(RunState::default()),
            events: None,
        }
    }

    /// Creates a run that also streams every change to `tx`.
    pub fn with_events(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self {
            events: Some(tx),
            ..Self::new()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.lock().ended_at
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended_at.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            // The host may have stopped listening.
            let _ = tx.send(event);
        }
    }

    pub fn append_output(&self, text: &str) {
        {
            let mut state = self.lock();
            if state.ended_at.is_some() {
                return;
            }
            state.output.push_str(text);
        }
        self.emit(RunEvent::Output(text.to_string()));
    }

    pub fn set_state(&self, node: NodeId, result: TestResultState) {
        {
            let mut state = self.lock();
            if state.ended_at.is_some() {
                return;
            }
            state.states.insert(node, result);
        }
        self.emit(RunEvent::State {
            node,
            state: result,
        });
    }

    pub fn append_message(&self, node: NodeId, message: TestMessage) {
        {
            let mut state = self.lock();
            if state.ended_at.is_some() {
                return;
            }
            state
                .messages
                .entry(node)
                .or_default()
                .push(message.clone());
        }
        self.emit(RunEvent::Message { node, message });
    }

    /// Ends the run. Calling it again has no effect.
    pub fn end(&self) {
        {
            let mut state = self.lock();
            if state.ended_at.is_some() {
                return;
            }
            state.ended_at = Some(Utc::now());
        }
        self.emit(RunEvent::Ended);
    }

    pub fn state(&self, node: NodeId) -> Option<TestResultState> {
        self.lock().states.get(&node).copied()
    }

    pub fn messages(&self, node: NodeId) -> Vec<TestMessage> {
        self.lock().messages.get(&node).cloned().unwrap_or_default()
    }

    pub fn output(&self) -> String {
        self.lock().output.clone()
    }

    /// Counts the recorded leaf states.
    pub fn tally(&self) -> RunTally {
        let state = self.lock();
        let mut tally = RunTally::default();
        for result in state.states.values() {
            match result {
                TestResultState::Passed => tally.passed += 1,
                TestResultState::Failed => tally.failed += 1,
                TestResultState::Errored => tally.errored += 1,
                TestResultState::Skipped => tally.skipped += 1,
                TestResultState::Unset => tally.unset += 1,
                TestResultState::Running => tally.running += 1,
            }
        }
        tally
    }
}

impl Default for TestRun {
    fn default() -> Self {
        Self::new()
    }
}

/// What the host asked to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestRunRequest {
    pub tests: Vec<NodeId>,
    pub exclude: Vec<NodeId>,
    pub debug: bool,
}

impl TestRunRequest {
    pub fn new(tests: Vec<NodeId>) -> Self {
        Self {
            tests,
            ..Self::default()
        }
    }
}

/// Per-workspace inputs shared by every node of a run.
#[derive(Debug, Clone)]
pub struct TestRunOptions {
    pub workspace_folder: PathBuf,
    pub cwd: PathBuf,
    pub args: Vec<String>,
    pub token: CancellationToken,
    /// How long a streamed result may take; the runner's own default if unset.
    pub result_timeout: Option<Duration>,
}

/// [`TestRunOptions`] plus the request's exclusions and mode.
#[derive(Debug, Clone)]
pub struct TestRunInstanceOptions {
    pub workspace_folder: PathBuf,
    pub cwd: PathBuf,
    pub args: Vec<String>,
    pub token: CancellationToken,
    pub result_timeout: Option<Duration>,
    pub exclude: HashSet<NodeId>,
    pub debug: bool,
}

impl TestRunInstanceOptions {
    pub fn new(options: TestRunOptions, request: &TestRunRequest) -> Self {
        Self {
            workspace_folder: options.workspace_folder,
            cwd: options.cwd,
            args: options.args,
            token: options.token,
            result_timeout: options.result_timeout,
            exclude: request.exclude.iter().copied().collect(),
            debug: request.debug,
        }
    }
}
