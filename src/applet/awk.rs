//! The `awk` applet: command line, program loading and the run itself.

use super::{EXIT_FAILURE, EXIT_SUCCESS, Io, file_error, usage_error};
use crate::action::execute;
use crate::builtins::expand_escapes;
use crate::cli::{self, Args, Command, USAGE};
use crate::error::RuntimeError;
use crate::parser::{Var, parse_program};
use crate::runtime::{Runtime, Value};

const NAME: &str = "awk";

pub fn run(io: &mut Io<'_>) -> i32 {
    let args = match cli::parse_args(&io.args) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            let _ = writeln!(io.stdout, "usage: {}", USAGE);
            return EXIT_SUCCESS;
        }
        Ok(Command::Version) => {
            let _ = writeln!(io.stdout, "awk (awkbox) {}", env!("CARGO_PKG_VERSION"));
            return EXIT_SUCCESS;
        }
        Err(message) => return usage_error(io.stderr, NAME, &message, USAGE),
    };

    let source = match load_program(io, &args) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let program = match parse_program(&source) {
        Ok(program) => program,
        Err(e) => {
            let _ = writeln!(io.stderr, "{}: {}", NAME, e);
            return e.exit_code();
        }
    };

    let mut rt = Runtime::new();
    if let Err(e) = seed_runtime(&mut rt, io, &args) {
        let _ = writeln!(io.stderr, "{}: {}", NAME, e);
        return EXIT_FAILURE;
    }

    let result = execute(&program, &mut rt, &mut *io.stdin, io.files, &mut *io.stdout);
    match result {
        Ok(status) => status,
        Err(e) => {
            let _ = io.stdout.flush();
            let _ = writeln!(io.stderr, "{}: {}", NAME, e);
            EXIT_FAILURE
        }
    }
}

/// The inline program, or every `-f` file joined by newlines.
fn load_program(io: &mut Io<'_>, args: &Args) -> Result<String, i32> {
    if let Some(text) = &args.program {
        return Ok(text.clone());
    }
    let mut parts = Vec::with_capacity(args.program_files.len());
    for path in &args.program_files {
        match io.files.read_to_string(path) {
            Ok(text) => parts.push(text),
            Err(e) => return Err(file_error(io.stderr, NAME, path, &e)),
        }
    }
    Ok(parts.join("\n"))
}

/// `FS`, `-v` assignments, `ARGV`/`ARGC` and `ENVIRON`, set before BEGIN.
fn seed_runtime(rt: &mut Runtime, io: &Io<'_>, args: &Args) -> Result<(), RuntimeError> {
    if let Some(fs) = &args.field_separator {
        rt.set_global("FS", Value::from_string(fs.as_str()))?;
    }
    for (name, raw) in &args.assignments {
        if let Some(c) = cli::unknown_escape(raw) {
            tracing::warn!(variable = %name, escape = %c, "unknown escape sequence kept as written");
        }
        rt.set_global(name, Value::from_input(expand_escapes(raw).0))?;
    }

    rt.set_global_element("ARGV", "0", Value::from_string(NAME))?;
    for (i, operand) in args.operands.iter().enumerate() {
        rt.set_global_element("ARGV", &(i + 1).to_string(), Value::from_input(operand.as_str()))?;
    }
    rt.set_global("ARGC", Value::from_number((args.operands.len() + 1) as f64))?;

    // an empty ENVIRON still has to be an array
    rt.array_id(&Var::Global("ENVIRON".to_string()))?;
    for (key, value) in &io.env {
        rt.set_global_element("ENVIRON", key, Value::from_input(value.as_str()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applet::{EXIT_USAGE, FileSource, MemFiles};

    struct Outcome {
        code: i32,
        stdout: String,
        stderr: String,
    }

    fn awk_with(args: &[&str], stdin: &str, files: &dyn FileSource, env: &[(&str, &str)]) -> Outcome {
        let mut input = stdin.as_bytes();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = {
            let mut io = Io {
                stdin: &mut input,
                stdout: &mut stdout,
                stderr: &mut stderr,
                args: args.iter().map(|s| s.to_string()).collect(),
                env: env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                files,
            };
            run(&mut io)
        };
        Outcome {
            code,
            stdout: String::from_utf8(stdout).unwrap(),
            stderr: String::from_utf8(stderr).unwrap(),
        }
    }

    fn awk(args: &[&str], stdin: &str) -> Outcome {
        awk_with(args, stdin, &MemFiles::new(), &[])
    }

    #[test]
    fn field_separator_option() {
        let out = awk(&["-F:", "{ print $2 }"], "a:b:c\nd:e:f\n");
        assert_eq!(out.code, 0);
        assert_eq!(out.stdout, "b\ne\n");
    }

    #[test]
    fn tab_separator_shorthand() {
        let out = awk(&["-Ft", "{ print $1 }"], "x y\tz\n");
        assert_eq!(out.stdout, "x y\n");
    }

    #[test]
    fn assignment_before_begin_with_escapes() {
        let out = awk(&["-v", "x=a\\tb", "-v", "n=010", "BEGIN { print x; print n + 1 }"], "");
        assert_eq!(out.stdout, "a\tb\n11\n");
    }

    #[test]
    fn program_files_are_joined_in_order() {
        let files = MemFiles::new()
            .with("one.awk", "function twice(x) { return 2 * x }")
            .with("two.awk", "BEGIN { print twice(21) }");
        let out = awk_with(&["-f", "one.awk", "-f", "two.awk"], "", &files, &[]);
        assert_eq!(out.code, 0, "{}", out.stderr);
        assert_eq!(out.stdout, "42\n");
    }

    #[test]
    fn missing_program_file() {
        let out = awk(&["-f", "nope.awk"], "");
        assert_eq!(out.code, EXIT_FAILURE);
        assert!(out.stderr.starts_with("awk: nope.awk:"), "{}", out.stderr);
    }

    #[test]
    fn file_operands_and_assignments() {
        let files = MemFiles::new().with("a", "1 2\n").with("b", "3:4\n");
        let out = awk_with(&["{ print FILENAME, $2 }", "a", "FS=:", "b"], "", &files, &[]);
        assert_eq!(out.stdout, "a 2\nb 4\n");
    }

    #[test]
    fn missing_input_file_fails() {
        let out = awk(&["{ print }", "missing"], "");
        assert_eq!(out.code, EXIT_FAILURE);
        assert!(out.stderr.contains("missing"), "{}", out.stderr);
    }

    #[test]
    fn argv_and_environ() {
        let out = awk_with(
            &["BEGIN { print ARGC, ARGV[0], ARGV[2], ENVIRON[\"HOME\"] }", "x", "y"],
            "",
            &MemFiles::new(),
            &[("HOME", "/home/me")],
        );
        assert_eq!(out.stdout, "3 awk y /home/me\n");
    }

    #[test]
    fn syntax_error_is_usage_class() {
        let out = awk(&["BEGIN { print ( }"], "");
        assert_eq!(out.code, EXIT_USAGE);
        assert!(out.stderr.starts_with("awk: "), "{}", out.stderr);
        assert!(out.stdout.is_empty());
    }

    #[test]
    fn runtime_error_fails_after_flushing_output() {
        let out = awk(&["BEGIN { print \"before\"; x = 1 / 0; print \"after\" }"], "");
        assert_eq!(out.code, EXIT_FAILURE);
        assert_eq!(out.stdout, "before\n");
        assert!(out.stderr.contains("division by zero"), "{}", out.stderr);
    }

    #[test]
    fn exit_status_is_returned() {
        let out = awk(&["{ exit $1 } END { print \"end\" }"], "3\n4\n");
        assert_eq!(out.code, 3);
        assert_eq!(out.stdout, "end\n");
    }

    #[test]
    fn usage_errors() {
        let out = awk(&[], "");
        assert_eq!(out.code, EXIT_USAGE);
        assert!(out.stderr.contains("usage:"));

        let out = awk(&["-x", "1"], "");
        assert_eq!(out.code, EXIT_USAGE);
    }

    #[test]
    fn recursion_limit_holds_on_the_calling_thread() {
        let out = awk(&["function r(n) { return r(n + 1) } BEGIN { r(0) }"], "");
        assert_eq!(out.code, EXIT_FAILURE);
        assert!(out.stderr.contains("function call nesting exceeds 1024 levels"), "{}", out.stderr);
    }

    #[test]
    fn help_goes_to_stdout() {
        let out = awk(&["--help"], "");
        assert_eq!(out.code, EXIT_SUCCESS);
        assert!(out.stdout.starts_with("usage: awk"));
    }
}
