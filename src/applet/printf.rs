//! The `printf` applet: `printf format [argument...]`.

use super::{EXIT_FAILURE, EXIT_SUCCESS, Io, usage_error};
use crate::builtins::{Format, expand_escapes};

const NAME: &str = "printf";
const USAGE: &str = "printf format [argument...]";

/// The format is applied once, then again for as long as arguments remain.
pub fn run(io: &mut Io<'_>) -> i32 {
    let Some((format, args)) = io.args.split_first() else {
        return usage_error(io.stderr, NAME, "missing format", USAGE);
    };

    let (format, stop_after_format) = expand_escapes(format);
    let format = match Format::compile(&format) {
        Ok(f) => f,
        Err(e) => {
            let _ = writeln!(io.stderr, "{}: {}", NAME, e);
            return EXIT_FAILURE;
        }
    };

    let mut out = String::new();
    let mut rest = args;
    loop {
        let progress = match format.render_into(rest, &mut out) {
            Ok(progress) => progress,
            Err(e) => {
                let _ = io.stdout.write_all(out.as_bytes()).and_then(|()| io.stdout.flush());
                let _ = writeln!(io.stderr, "{}: {}", NAME, e);
                return EXIT_FAILURE;
            }
        };
        rest = &rest[progress.consumed..];
        if progress.stopped || stop_after_format || rest.is_empty() || !format.consumes_args() {
            break;
        }
        // a format that takes arguments but consumed none would loop forever
        if progress.consumed == 0 {
            break;
        }
    }

    if let Err(e) = io.stdout.write_all(out.as_bytes()).and_then(|()| io.stdout.flush()) {
        let _ = writeln!(io.stderr, "{}: write error: {}", NAME, e);
        return EXIT_FAILURE;
    }
    EXIT_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applet::{EXIT_USAGE, MemFiles};

    fn printf(args: &[&str]) -> (i32, String, String) {
        let mut stdin: &[u8] = b"";
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let files = MemFiles::new();
        let code = {
            let mut io = Io {
                stdin: &mut stdin,
                stdout: &mut stdout,
                stderr: &mut stderr,
                args: args.iter().map(|s| s.to_string()).collect(),
                env: Vec::new(),
                files: &files,
            };
            run(&mut io)
        };
        (code, String::from_utf8(stdout).unwrap(), String::from_utf8(stderr).unwrap())
    }

    #[test]
    fn single_application() {
        assert_eq!(printf(&["%s=%d\\n", "x", "42"]).1, "x=42\n");
    }

    #[test]
    fn format_is_reapplied_while_arguments_remain() {
        assert_eq!(printf(&["[%s]", "a", "b", "c"]).1, "[a][b][c]");
        assert_eq!(printf(&["%s %s\\n", "a", "b", "c"]).1, "a b\nc \n");
    }

    #[test]
    fn no_conversions_prints_once() {
        assert_eq!(printf(&["hi\\n", "ignored"]).1, "hi\n");
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(printf(&["%05.1f|%x|%o|%c", "3.14159", "255", "8", "65"]).1, "003.1|ff|10|6");
        assert_eq!(printf(&["%-4d|", "7"]).1, "7   |");
    }

    #[test]
    fn escapes_in_arguments_with_b() {
        assert_eq!(printf(&["%b", "a\\tb"]).1, "a\tb");
        assert_eq!(printf(&["%b%s", "stop\\chere", "never"]).1, "stop");
    }

    #[test]
    fn backslash_c_in_format_stops_output() {
        assert_eq!(printf(&["%s\\c tail", "a", "b"]).1, "a");
    }

    #[test]
    fn errors() {
        let (code, _, err) = printf(&[]);
        assert_eq!(code, EXIT_USAGE);
        assert!(err.contains("usage: printf"));

        let (code, out, err) = printf(&["%z", "1"]);
        assert_eq!(code, EXIT_FAILURE);
        assert!(out.is_empty());
        assert!(err.starts_with("printf: "));
    }
}
