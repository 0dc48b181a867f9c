use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

use testbridge_core::config::ConfigurationService;
use testbridge_core::process::{PythonProcess, Scripts, UnavailableDebugLauncher};
use testbridge_core::tree::TestData;
use testbridge_core::{
    CancellationToken, NodeId, PythonTestController, RunEvent, TestController,
    TestRangeProvider, TestRun, TestRunRequest, TestTree, WorkspaceConfiguration,
};

#[derive(Parser)]
#[command(name = "testbridge")]
#[command(about = "Discover and run pytest/unittest suites", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the tests of a workspace
    Discover {
        /// Workspace folder
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run tests by id (the whole workspace when none are given)
    Run {
        /// Workspace folder
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Ids to leave out of the run
        #[arg(short, long)]
        exclude: Vec<String>,
        /// Test ids as shown by `discover`
        ids: Vec<String>,
    },
    /// Show where tests are defined in a file
    Locate {
        /// Test file
        file: PathBuf,
        /// Test names to look up
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print the effective configuration
    Config {
        /// Workspace folder
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "testbridge=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Discover { workspace, json } => discover(&workspace, json).await,
        Commands::Run {
            workspace,
            exclude,
            ids,
        } => run(&workspace, &exclude, &ids).await,
        Commands::Locate { file, names } => locate(&file, &names).await,
        Commands::Config { workspace } => {
            let config = WorkspaceConfiguration.settings(&absolute(&workspace)?)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// Builds the controller. The interpreter and scripts directory are taken
/// from the configuration in effect right now; everything else is read on
/// each call.
fn controller(workspace: &Path) -> Result<PythonTestController> {
    let config = WorkspaceConfiguration.settings(workspace)?;
    Ok(PythonTestController::from_services(
        Arc::new(WorkspaceConfiguration),
        Arc::new(PythonProcess::from_config(&config.interpreter)),
        Arc::new(UnavailableDebugLauncher),
        Scripts::from_config(&config.interpreter),
    ))
}

/// A token cancelled by Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancelling...");
            handle.cancel();
        }
    });
    token
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn discover_tree(workspace: &Path, token: &CancellationToken) -> Result<Option<TestTree>> {
    let controller = controller(workspace)?;
    let pb = spinner("Discovering tests...");
    let tree = controller.create_workspace_tests(workspace, token).await;
    pb.finish_and_clear();
    Ok(tree?)
}

async fn discover(workspace: &Path, json: bool) -> Result<()> {
    let workspace = absolute(workspace)?;
    let token = ctrl_c_token();
    let Some(tree) = discover_tree(&workspace, &token).await? else {
        println!("No tests found in {}", workspace.display());
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&JsonNode::new(&tree, tree.root()))?);
    } else {
        print_tree(&tree);
    }
    Ok(())
}

async fn run(workspace: &Path, exclude: &[String], ids: &[String]) -> Result<()> {
    let workspace = absolute(workspace)?;
    let token = ctrl_c_token();
    let Some(tree) = discover_tree(&workspace, &token).await? else {
        println!("No tests found in {}", workspace.display());
        return Ok(());
    };

    let mut request = TestRunRequest::new(if ids.is_empty() {
        vec![tree.root()]
    } else {
        resolve(&tree, ids)?
    });
    request.exclude = resolve(&tree, exclude)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let run = TestRun::with_events(tx);
    debug!(run = run.id(), "Starting test run");

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                RunEvent::Output(text) => print!("{}", text.replace("\r\n", "\n")),
                RunEvent::Ended => break,
                RunEvent::State { .. } | RunEvent::Message { .. } => {}
            }
        }
    });

    let controller = controller(&workspace)?;
    let result = controller.run_tests(&tree, &request, &token, &run).await;
    run.end();
    printer.await?;
    result?;

    let tally = run.tally();
    println!();
    println!(
        "{} passed, {} failed, {} errored, {} skipped, {} without result",
        tally.passed, tally.failed, tally.errored, tally.skipped, tally.unset
    );
    if tally.failed + tally.errored > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn resolve(tree: &TestTree, ids: &[String]) -> Result<Vec<NodeId>> {
    ids.iter()
        .map(|id| tree.find(id).ok_or_else(|| eyre!("Unknown test id: {id}")))
        .collect()
}

async fn locate(file: &Path, names: &[String]) -> Result<()> {
    let file = absolute(file)?;
    let workspace = file.parent().map(Path::to_path_buf).unwrap_or_default();
    let config = WorkspaceConfiguration.settings(&workspace)?;
    let provider = TestRangeProvider::new(
        Arc::new(PythonProcess::from_config(&config.interpreter)),
        Scripts::from_config(&config.interpreter),
    );
    let token = ctrl_c_token();
    let ranges = provider.get_range(&file, names, Some(&token)).await?;
    for (name, range) in names.iter().zip(ranges) {
        match range {
            Some(range) => println!(
                "{name}: {}:{}-{}:{}",
                range.start.line + 1,
                range.start.character,
                range.end.line + 1,
                range.end.character
            ),
            None => println!("{name}: not found"),
        }
    }
    Ok(())
}

fn kind(data: &TestData) -> &'static str {
    match data {
        TestData::WorkspaceRoot => "root",
        TestData::Folder(_) => "folder",
        TestData::File(_) => "file",
        TestData::Collection(_) => "collection",
        TestData::Case(_) => "case",
    }
}

fn print_tree(tree: &TestTree) {
    let root = &tree[tree.root()];
    println!("{} [{}]", root.label, root.id);
    print_children(tree, tree.root(), "");
}

fn print_children(tree: &TestTree, node: NodeId, prefix: &str) {
    let children = tree.children(node);
    for (i, child) in children.iter().enumerate() {
        let last = i == children.len() - 1;
        let item = &tree[*child];
        let connector = if last { "└── " } else { "├── " };
        println!("{prefix}{connector}{} [{}]", item.label, item.id);
        let next = format!("{prefix}{}", if last { "    " } else { "│   " });
        print_children(tree, *child, &next);
    }
}

#[derive(Serialize)]
struct JsonNode {
    id: String,
    label: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<JsonNode>,
}

impl JsonNode {
    fn new(tree: &TestTree, id: NodeId) -> Self {
        let node = &tree[id];
        Self {
            id: node.id.clone(),
            label: node.label.clone(),
            kind: kind(&node.data),
            uri: node.uri.clone(),
            line: node.range.map(|range| range.start.line),
            children: tree
                .children(id)
                .iter()
                .map(|child| JsonNode::new(tree, *child))
                .collect(),
        }
    }
}
