//! unittest command-line vocabulary.

use super::get_option_values;
use crate::config::{DEFAULT_UNITTEST_PATTERN, DEFAULT_UNITTEST_START_DIR};

/// Fail-fast marker passed from [`get_test_run_args`] to the runner.
pub const FAIL_FAST_FLAG: &str = "--uf";

fn first_value(args: &[String], short: &str, long: &str) -> Option<String> {
    get_option_values(args, short)
        .into_iter()
        .chain(get_option_values(args, long))
        .next()
}

/// The discovery start directory (`-s`/`--start-directory`), or `.`.
pub fn get_test_folders(args: &[String]) -> Vec<String> {
    vec![first_value(args, "-s", "--start-directory")
        .unwrap_or_else(|| DEFAULT_UNITTEST_START_DIR.to_string())]
}

/// The test file pattern (`-p`/`--pattern`), or `test*.py`.
pub fn get_test_pattern(args: &[String]) -> String {
    first_value(args, "-p", "--pattern").unwrap_or_else(|| DEFAULT_UNITTEST_PATTERN.to_string())
}

/// Translates `python -m unittest` arguments into launcher arguments.
pub fn get_test_run_args(args: &[String]) -> Vec<String> {
    let start_dir = get_test_folders(args).remove(0);
    let pattern = get_test_pattern(args);
    let verbosity = if args.iter().any(|arg| arg.starts_with("-v")) {
        2
    } else {
        1
    };

    let mut run_args = vec![
        format!("--us={start_dir}"),
        format!("--up={pattern}"),
        format!("--uvInt={verbosity}"),
    ];
    if args.iter().any(|arg| arg == "-f" || arg == "--failfast") {
        run_args.push(FAIL_FAST_FLAG.to_string());
    }
    run_args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        assert_eq!(get_test_folders(&[]), args(&["."]));
        assert_eq!(get_test_pattern(&[]), "test*.py");
        assert_eq!(get_test_run_args(&[]), args(&["--us=.", "--up=test*.py", "--uvInt=1"]));
    }

    #[test]
    fn test_run_args_from_configured_args() {
        let input = args(&["-v", "-s", "./tests", "-p", "*_test.py", "--failfast"]);
        assert_eq!(get_test_folders(&input), args(&["./tests"]));
        assert_eq!(
            get_test_run_args(&input),
            args(&["--us=./tests", "--up=*_test.py", "--uvInt=2", "--uf"])
        );
    }

    #[test]
    fn test_long_options() {
        let input = args(&["--start-directory=src", "--pattern=check_*.py", "-f"]);
        assert_eq!(
            get_test_run_args(&input),
            args(&["--us=src", "--up=check_*.py", "--uvInt=1", "--uf"])
        );
    }
}
