use std::env;
use std::io::{self, BufReader, BufWriter, Write};
use std::process;

use awkbox::applet::{self, Io, OsFiles};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_env("AWKBOX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn main() {
    init_logging();

    // the interpreter runs on its own thread, so no locked handles here
    let mut stdin = BufReader::new(io::stdin());
    let mut stdout = BufWriter::new(io::stdout());
    let mut stderr = io::stderr();

    let code = {
        let mut io = Io {
            stdin: &mut stdin,
            stdout: &mut stdout,
            stderr: &mut stderr,
            args: Vec::new(),
            env: env::vars().collect(),
            files: &OsFiles,
        };
        applet::dispatch(env::args().collect(), &mut io)
    };

    if let Err(e) = stdout.flush() {
        let _ = writeln!(stderr, "awkbox: write error: {}", e);
        process::exit(applet::EXIT_FAILURE);
    }
    process::exit(code);
}
