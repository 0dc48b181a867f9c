//! pytest command-line vocabulary.

use std::path::Path;

use super::{
    filter_arguments, get_option_values, get_positional_arguments, remove_positional_arguments,
};

/// pytest options that take a separate value.
pub const OPTIONS_WITH_VALUES: &[&str] = &[
    "-c",
    "-k",
    "-m",
    "-o",
    "-p",
    "-r",
    "-W",
    "--assert",
    "--basetemp",
    "--cache-show",
    "--capture",
    "--code-highlight",
    "--color",
    "--confcutdir",
    "--cov",
    "--cov-config",
    "--cov-fail-under",
    "--cov-report",
    "--deselect",
    "--dist",
    "--doctest-glob",
    "--doctest-report",
    "--durations",
    "--durations-min",
    "--ignore",
    "--ignore-glob",
    "--import-mode",
    "--junit-prefix",
    "--junit-xml",
    "--junitxml",
    "--log-cli-date-format",
    "--log-cli-format",
    "--log-cli-level",
    "--log-date-format",
    "--log-file",
    "--log-file-date-format",
    "--log-file-format",
    "--log-file-level",
    "--log-format",
    "--log-level",
    "--maxfail",
    "--override-ini",
    "--pastebin",
    "--pdbcls",
    "--pythonwarnings",
    "--result-log",
    "--rootdir",
    "--show-capture",
    "--tb",
    "--verbosity",
    "--max-slave-restart",
    "--numprocesses",
    "--rsyncdir",
    "--rsyncignore",
    "--tx",
    "-n",
];

/// pytest options that are plain flags.
pub const OPTIONS_WITHOUT_VALUES: &[&str] = &[
    "--cache-clear",
    "--collect-in-virtualenv",
    "--collect-only",
    "--co",
    "--continue-on-collection-errors",
    "--cov-append",
    "--cov-branch",
    "--debug",
    "--disable-pytest-warnings",
    "--disable-warnings",
    "--doctest-continue-on-failure",
    "--doctest-ignore-import-errors",
    "--doctest-modules",
    "--exitfirst",
    "--failed-first",
    "--ff",
    "--fixtures",
    "--fixtures-per-test",
    "--force-sugar",
    "--full-trace",
    "--funcargs",
    "--help",
    "--keep-duplicates",
    "--last-failed",
    "--lf",
    "--markers",
    "--new-first",
    "--nf",
    "--no-cov",
    "--no-cov-on-fail",
    "--no-print-logs",
    "--noconftest",
    "--old-summary",
    "--pdb",
    "--pyargs",
    "--quiet",
    "--runxfail",
    "--setup-only",
    "--setup-plan",
    "--setup-show",
    "--showlocals",
    "--stepwise",
    "--sw",
    "--stepwise-skip",
    "--strict",
    "--strict-config",
    "--strict-markers",
    "--trace-config",
    "--verbose",
    "--version",
    "-h",
    "-l",
    "-q",
    "-s",
    "-v",
    "-vv",
    "-x",
    "--boxed",
    "--forked",
    "--looponfail",
    "--trace",
    "-d",
];

/// Inputs for building a discovery invocation.
#[derive(Debug, Clone)]
pub struct DiscoveryArgsOptions<'a> {
    pub args: &'a [String],
    pub workspace_folder: &'a Path,
    pub ignore_cache: bool,
}

/// Test directories and files named on the command line.
pub fn get_test_folders(args: &[String]) -> Vec<String> {
    get_positional_arguments(args, OPTIONS_WITH_VALUES, OPTIONS_WITHOUT_VALUES)
}

pub fn remove_positional_folders_and_files(args: &[String]) -> Vec<String> {
    remove_positional_arguments(args, OPTIONS_WITH_VALUES, OPTIONS_WITHOUT_VALUES)
}

/// Rewrites configured arguments for a discovery invocation.
///
/// Positional paths are removed (the caller scopes each invocation to one
/// directory), `-s` is forced so the adapter's output is not captured, and
/// `--rootdir` defaults to the workspace.
pub fn prepare_arguments_for_discovery(options: &DiscoveryArgsOptions<'_>) -> Vec<String> {
    let mut args = remove_positional_folders_and_files(options.args);

    if options.ignore_cache && !args.iter().any(|arg| arg == "--cache-clear") {
        args.insert(0, "--cache-clear".to_string());
    }
    if !args.iter().any(|arg| arg == "-s") {
        args.insert(0, "-s".to_string());
    }
    if get_option_values(&args, "--rootdir").is_empty() {
        args.insert(0, options.workspace_folder.to_string_lossy().into_owned());
        args.insert(0, "--rootdir".to_string());
    }
    args
}

/// The user's own JUnit output file, when exactly one was requested.
pub fn junit_file_from_args(args: &[String]) -> Option<String> {
    let mut values = get_option_values(args, "--junit-xml");
    values.extend(get_option_values(args, "--junitxml"));
    match values.len() {
        1 => values.pop(),
        _ => None,
    }
}

/// Rewrites configured arguments for running one node.
///
/// The user's JUnit flags are replaced by ours so exactly one results file
/// is written, and the node's raw id becomes the only positional argument.
pub fn prepare_arguments_for_run(
    args: &[String],
    workspace_folder: &Path,
    junit_file: &Path,
    raw_id: &str,
) -> Vec<String> {
    let args = remove_positional_folders_and_files(args);
    let args = filter_arguments(&args, &["--junit-xml", "--junitxml"], &[]);

    let mut run_args = vec![
        "--rootdir".to_string(),
        workspace_folder.to_string_lossy().into_owned(),
        "--override-ini".to_string(),
        "junit_family=xunit1".to_string(),
        format!("--junit-xml={}", junit_file.to_string_lossy()),
    ];
    run_args.extend(args);
    run_args.push(raw_id.to_string());
    run_args
}
