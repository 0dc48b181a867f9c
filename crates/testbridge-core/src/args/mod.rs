//! Command-line argument translation for the test runners.
//!
//! The helpers here are runner-agnostic; [`pytest`] and [`unittest`] know
//! each runner's option vocabulary.

pub mod pytest;
pub mod unittest;

use tracing::warn;

/// Values of `option`, given either as `--opt value` or `--opt=value`.
///
/// Repeated options accumulate in order.
pub fn get_option_values(args: &[String], option: &str) -> Vec<String> {
    let prefix = format!("{option}=");
    let mut values = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == option {
            if let Some(value) = iter.next() {
                values.push(value.clone());
            }
        } else if let Some(value) = arg.strip_prefix(&prefix) {
            values.push(value.to_string());
        }
    }
    values
}

/// Indices of the positional arguments in `args`.
///
/// Options listed in `with_values` consume the next token; unknown `-x`
/// tokens are treated as flags and unknown `key=value` tokens as options.
pub fn positional_indices(
    args: &[String],
    with_values: &[&str],
    without_values: &[&str],
) -> Vec<usize> {
    let mut positional = Vec::new();
    let mut skip_next = false;
    for (index, arg) in args.iter().enumerate() {
        if skip_next {
            skip_next = false;
            continue;
        }
        if without_values.contains(&arg.as_str()) {
            continue;
        }
        if with_values.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if with_values
            .iter()
            .any(|option| arg.starts_with(&format!("{option}=")))
        {
            continue;
        }
        if arg.starts_with('-') {
            warn!(arg = %arg, "Unknown command line option passed to test runner, treating it as a flag");
            continue;
        }
        if arg.find('=').is_some_and(|pos| pos > 0) {
            continue;
        }
        positional.push(index);
    }
    positional
}

/// The positional arguments in `args` (test directories and files).
pub fn get_positional_arguments(
    args: &[String],
    with_values: &[&str],
    without_values: &[&str],
) -> Vec<String> {
    positional_indices(args, with_values, without_values)
        .into_iter()
        .map(|i| args[i].clone())
        .collect()
}

/// `args` without its positional arguments.
pub fn remove_positional_arguments(
    args: &[String],
    with_values: &[&str],
    without_values: &[&str],
) -> Vec<String> {
    let positional = positional_indices(args, with_values, without_values);
    args.iter()
        .enumerate()
        .filter(|(i, _)| !positional.contains(i))
        .map(|(_, arg)| arg.clone())
        .collect()
}

/// Removes the listed options from `args`.
///
/// Options in `with_values` are removed together with their separate value
/// token, or in their `--opt=value` form. A trailing `*` in an option name
/// matches any option with that prefix.
pub fn filter_arguments(
    args: &[String],
    with_values: &[&str],
    without_values: &[&str],
) -> Vec<String> {
    let mut kept = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if without_values.iter().any(|option| option_matches(option, arg)) {
            continue;
        }
        if with_values.iter().any(|option| option_matches(option, arg)) {
            skip_next = true;
            continue;
        }
        if with_values
            .iter()
            .any(|option| inline_value_matches(option, arg))
        {
            continue;
        }
        kept.push(arg.clone());
    }
    kept
}

fn option_matches(option: &str, arg: &str) -> bool {
    match option.strip_suffix('*') {
        Some(prefix) => arg.starts_with(prefix) && !arg.contains('='),
        None => option == arg,
    }
}

fn inline_value_matches(option: &str, arg: &str) -> bool {
    let Some((name, _)) = arg.split_once('=') else {
        return false;
    };
    match option.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => option == name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_get_option_values() {
        let cases: &[(&[&str], &str, &[&str])] = &[
            (&[], "--one", &[]),
            (&["--one", "1"], "--one", &["1"]),
            (&["--one", "1", "--end"], "--one", &["1"]),
            (&["--zero", "--one", "1", "--end"], "--one", &["1"]),
            (&["--zero", "--one=1", "--end"], "--one", &["1"]),
            (&["--zero", "--many=1", "--many=2", "--many=3", "--end"], "--many", &["1", "2", "3"]),
            (&["--zero", "--spaces", "1 2 3", "--end"], "--spaces", &["1 2 3"]),
        ];

        for (input, option, expected) in cases {
            assert_eq!(
                get_option_values(&args(input), option),
                args(expected),
                "get_option_values({input:?}, {option})"
            );
        }
    }

    #[test]
    fn test_positional_arguments() {
        let input = args(&["-k", "math", "tests", "--verbose", "-x", "a=b", "unit/test_a.py"]);
        let positional = get_positional_arguments(&input, &["-k"], &["--verbose"]);
        assert_eq!(positional, args(&["tests", "unit/test_a.py"]));

        let rest = remove_positional_arguments(&input, &["-k"], &["--verbose"]);
        assert_eq!(rest, args(&["-k", "math", "--verbose", "-x", "a=b"]));
    }

    #[test]
    fn test_filter_arguments() {
        let input = args(&[
            "--junitxml",
            "out.xml",
            "--junit-xml=other.xml",
            "-v",
            "--log-cli-level",
            "DEBUG",
            "--log-file=x.log",
            "tests",
        ]);
        let filtered = filter_arguments(&input, &["--junitxml", "--junit-xml", "--log-*"], &["-v"]);
        assert_eq!(filtered, args(&["tests"]));
    }
}
