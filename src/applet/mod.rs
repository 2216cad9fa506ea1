//! Applet plumbing shared by every tool in the box: the process I/O
//! handed to an applet, exit codes, error helpers and the dispatch table.

pub mod awk;
pub mod printf;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use rustc_hash::FxHashMap;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Every file an applet touches goes through this.
pub trait FileSource: Sync {
    fn open(&self, path: &str) -> io::Result<Box<dyn BufRead + '_>>;

    fn read_to_string(&self, path: &str) -> io::Result<String> {
        let mut reader = self.open(path)?;
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(text)
    }
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFiles;

impl FileSource for OsFiles {
    fn open(&self, path: &str) -> io::Result<Box<dyn BufRead + '_>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

/// Files held in memory, keyed by path.
#[derive(Debug, Default, Clone)]
pub struct MemFiles {
    files: FxHashMap<String, String>,
}

impl MemFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, contents: &str) -> Self {
        self.files.insert(path.to_string(), contents.to_string());
        self
    }
}

impl FileSource for MemFiles {
    fn open(&self, path: &str) -> io::Result<Box<dyn BufRead + '_>> {
        match self.files.get(path) {
            Some(text) => Ok(Box::new(io::Cursor::new(text.as_bytes()))),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory")),
        }
    }
}

/// Process I/O handed to an applet.
pub struct Io<'a> {
    pub stdin: &'a mut (dyn BufRead + Send),
    pub stdout: &'a mut (dyn Write + Send),
    pub stderr: &'a mut dyn Write,
    /// Arguments after the applet name.
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub files: &'a dyn FileSource,
}

/// Report a usage problem and return the usage exit code.
pub fn usage_error(stderr: &mut dyn Write, applet: &str, message: &str, usage: &str) -> i32 {
    let _ = writeln!(stderr, "{}: {}", applet, message);
    let _ = writeln!(stderr, "usage: {}", usage);
    EXIT_USAGE
}

/// Report a file that could not be read and return the failure exit code.
pub fn file_error(stderr: &mut dyn Write, applet: &str, path: &str, err: &io::Error) -> i32 {
    let _ = writeln!(stderr, "{}: {}: {}", applet, path, err);
    EXIT_FAILURE
}

type Main = fn(&mut Io<'_>) -> i32;

/// Name and entry point of every applet in the box.
pub const APPLETS: &[(&str, Main)] = &[("awk", awk::run), ("printf", printf::run)];

pub fn find(name: &str) -> Option<Main> {
    APPLETS.iter().find(|(n, _)| *n == name).map(|(_, main)| *main)
}

/// Pick the applet from the invocation name (`awk` as a symlink) or, when
/// invoked as the box itself, from the first argument.
pub fn dispatch(argv: Vec<String>, io: &mut Io<'_>) -> i32 {
    let mut argv = argv.into_iter();
    let invoked = argv.next().unwrap_or_default();
    let base = Path::new(&invoked)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let (name, args): (String, Vec<String>) = if find(&base).is_some() {
        (base.clone(), argv.collect())
    } else {
        match argv.next() {
            Some(name) => (name, argv.collect()),
            None => return list_applets(io.stderr, &base),
        }
    };

    match find(&name) {
        Some(main) => {
            tracing::debug!(applet = %name, "dispatching");
            io.args = args;
            main(io)
        }
        None => {
            let _ = writeln!(io.stderr, "{}: applet not found", name);
            list_applets(io.stderr, &base)
        }
    }
}

fn list_applets(stderr: &mut dyn Write, program: &str) -> i32 {
    let _ = writeln!(stderr, "usage: {} APPLET [ARGS]...", program);
    let _ = write!(stderr, "applets:");
    for (name, _) in APPLETS {
        let _ = write!(stderr, " {}", name);
    }
    let _ = writeln!(stderr);
    EXIT_USAGE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(argv: &[&str]) -> (i32, String, String) {
        let mut stdin: &[u8] = b"";
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let files = MemFiles::new();
        let mut io = Io {
            stdin: &mut stdin,
            stdout: &mut stdout,
            stderr: &mut stderr,
            args: Vec::new(),
            env: Vec::new(),
            files: &files,
        };
        let code = dispatch(argv.iter().map(|s| s.to_string()).collect(), &mut io);
        (
            code,
            String::from_utf8(stdout).unwrap(),
            String::from_utf8(stderr).unwrap(),
        )
    }

    #[test]
    fn dispatch_by_invocation_name() {
        let (code, out, _) = run(&["/usr/bin/printf", "%s-%s\\n", "a", "b"]);
        assert_eq!(code, EXIT_SUCCESS);
        assert_eq!(out, "a-b\n");
    }

    #[test]
    fn dispatch_by_first_argument() {
        let (code, out, _) = run(&["awkbox", "awk", "BEGIN { print 1 + 1 }"]);
        assert_eq!(code, EXIT_SUCCESS);
        assert_eq!(out, "2\n");
    }

    #[test]
    fn unknown_applet() {
        let (code, _, err) = run(&["awkbox", "frobnicate"]);
        assert_eq!(code, EXIT_USAGE);
        assert!(err.contains("applet not found"));
        assert!(err.contains("awk printf"));
    }

    #[test]
    fn mem_files_missing_path() {
        let files = MemFiles::new().with("a", "x\n");
        assert_eq!(files.read_to_string("a").unwrap(), "x\n");
        assert_eq!(files.open("b").err().unwrap().kind(), io::ErrorKind::NotFound);
    }
}
