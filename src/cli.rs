//! Command line of the `awk` applet.

use crate::builtins::expand_escapes;

pub const USAGE: &str = "awk [-F fs] [-v name=value]... 'program' | -f progfile... [file | name=value]...";

#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub field_separator: Option<String>,
    /// `-v` assignments, values still carrying their backslash escapes.
    pub assignments: Vec<(String, String)>,
    pub program_files: Vec<String>,
    /// Inline program text; `None` when `-f` was given.
    pub program: Option<String>,
    pub operands: Vec<String>,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Run(Args),
    Help,
    Version,
}

/// Parse the arguments after the applet name. Options end at `--` or at
/// the first operand, which is the program text unless `-f` was used.
pub fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut parsed = Args::default();
    let mut rest: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        i += 1;

        if arg == "--" {
            rest.extend(args[i..].iter().cloned());
            break;
        }
        if arg == "-" || !arg.starts_with('-') {
            rest.extend(args[i - 1..].iter().cloned());
            break;
        }

        if arg == "--help" || arg == "-h" {
            return Ok(Command::Help);
        } else if arg == "--version" {
            return Ok(Command::Version);
        } else if let Some(fs) = arg.strip_prefix("-F") {
            let fs = option_value(fs, args, &mut i, "-F")?;
            parsed.field_separator = Some(field_separator(&fs));
        } else if let Some(rest) = arg.strip_prefix("-v") {
            let assignment = option_value(rest, args, &mut i, "-v")?;
            match split_assignment(&assignment) {
                Some((name, value)) => parsed.assignments.push((name.to_string(), value.to_string())),
                None => return Err(format!("invalid -v assignment: {}", assignment)),
            }
        } else if let Some(path) = arg.strip_prefix("-f") {
            let path = option_value(path, args, &mut i, "-f")?;
            parsed.program_files.push(path);
        } else {
            return Err(format!("unknown option: {}", arg));
        }
    }

    let mut rest = rest.into_iter();
    if parsed.program_files.is_empty() {
        match rest.next() {
            Some(text) => parsed.program = Some(text),
            None => return Err("no program given".to_string()),
        }
    }
    parsed.operands = rest.collect();
    Ok(Command::Run(parsed))
}

/// The value of an option given either attached (`-F:`) or as the next
/// argument (`-F :`).
fn option_value(attached: &str, args: &[String], i: &mut usize, flag: &str) -> Result<String, String> {
    if !attached.is_empty() {
        return Ok(attached.to_string());
    }
    match args.get(*i) {
        Some(value) => {
            *i += 1;
            Ok(value.clone())
        }
        None => Err(format!("{} requires an argument", flag)),
    }
}

/// `-F` value: `t` means tab, anything else has its escapes processed.
fn field_separator(fs: &str) -> String {
    if fs == "t" {
        return "\t".to_string();
    }
    expand_escapes(fs).0
}

/// Split `name=value` where `name` is a valid identifier. Used for `-v`
/// and for assignment operands.
pub fn split_assignment(s: &str) -> Option<(&str, &str)> {
    let (name, value) = s.split_once('=')?;
    if !is_valid_ident(name) {
        return None;
    }
    Some((name, value))
}

/// A backslash escape `expand_escapes` does not know, which it keeps as
/// written.
pub fn unknown_escape(s: &str) -> Option<char> {
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            continue;
        }
        match chars.next() {
            Some('n' | 't' | 'r' | 'a' | 'b' | 'f' | 'v' | '\\' | '"' | '\'' | 'c' | 'x' | '0'..='7') => {}
            Some(other) => return Some(other),
            None => {}
        }
    }
    None
}

fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run(list: &[&str]) -> Args {
        match parse_args(&args(list)).unwrap() {
            Command::Run(a) => a,
            other => panic!("expected Run, got {:?}", other),
        }
    }

    #[test]
    fn program_then_operands() {
        let a = run(&["{ print }", "a.txt", "x=1", "-"]);
        assert_eq!(a.program.as_deref(), Some("{ print }"));
        assert_eq!(a.operands, vec!["a.txt", "x=1", "-"]);
    }

    #[test]
    fn field_separator_forms() {
        assert_eq!(run(&["-F:", "1"]).field_separator.as_deref(), Some(":"));
        assert_eq!(run(&["-F", ",", "1"]).field_separator.as_deref(), Some(","));
        assert_eq!(run(&["-Ft", "1"]).field_separator.as_deref(), Some("\t"));
        assert_eq!(run(&["-F", "\\t", "1"]).field_separator.as_deref(), Some("\t"));
    }

    #[test]
    fn assignments_keep_raw_value() {
        let a = run(&["-v", "x=a\\tb", "-vy=2", "1"]);
        assert_eq!(
            a.assignments,
            vec![("x".to_string(), "a\\tb".to_string()), ("y".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn program_files_in_order() {
        let a = run(&["-f", "one.awk", "-ftwo.awk", "input"]);
        assert_eq!(a.program, None);
        assert_eq!(a.program_files, vec!["one.awk", "two.awk"]);
        assert_eq!(a.operands, vec!["input"]);
    }

    #[test]
    fn double_dash_ends_options() {
        let a = run(&["--", "-x", "file"]);
        assert_eq!(a.program.as_deref(), Some("-x"));
        assert_eq!(a.operands, vec!["file"]);
    }

    #[test]
    fn options_stop_at_program() {
        let a = run(&["{ print }", "-F:"]);
        assert_eq!(a.field_separator, None);
        assert_eq!(a.operands, vec!["-F:"]);
    }

    #[test]
    fn errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["-F"])).is_err());
        assert!(parse_args(&args(&["-v", "1x=2", "1"])).is_err());
        assert!(parse_args(&args(&["-q", "1"])).is_err());
    }

    #[test]
    fn help_and_version() {
        assert_eq!(parse_args(&args(&["--help"])).unwrap(), Command::Help);
        assert_eq!(parse_args(&args(&["--version"])).unwrap(), Command::Version);
    }

    #[test]
    fn assignment_names() {
        assert_eq!(split_assignment("FS=:"), Some(("FS", ":")));
        assert_eq!(split_assignment("a_1=x=y"), Some(("a_1", "x=y")));
        assert_eq!(split_assignment("=x"), None);
        assert_eq!(split_assignment("./file=1"), None);
        assert_eq!(split_assignment("plain"), None);
    }

    #[test]
    fn unknown_escapes() {
        assert_eq!(unknown_escape("a\\tb\\\\"), None);
        assert_eq!(unknown_escape("a\\qb"), Some('q'));
    }
}
