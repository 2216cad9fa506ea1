mod builtins_rt;
mod eval;
mod stmt;

use std::io::{BufRead, Write};
use std::panic;
use std::thread;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::applet::FileSource;
use crate::builtins::Format;
use crate::error::RuntimeError;
use crate::input::Input;
use crate::parser::{FuncDef, Pattern, Program};
use crate::runtime::{Runtime, Value};

/// Control flow that stays inside a function body or loop.
pub(crate) enum Signal {
    Return(Value),
    Break,
    Continue,
}

/// Control flow that unwinds past function calls to the rule loop, and
/// runtime errors, which unwind all the way out.
#[derive(Debug)]
pub(crate) enum Unwind {
    Next,
    NextFile,
    Exit(i32),
    Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(e: RuntimeError) -> Self {
        Unwind::Error(e)
    }
}

pub(crate) type Flow<T> = Result<T, Unwind>;

/// Stack for the interpreter thread. Evaluation recurses on the native
/// stack, and this has to hold `MAX_CALL_DEPTH` nested calls in an
/// unoptimised build.
const INTERPRETER_STACK: usize = 256 * 1024 * 1024;

/// Run `program` over `stdin` and the `ARGV` operands on a thread with
/// [`INTERPRETER_STACK`] bytes of stack. Returns the exit status.
pub fn execute(
    program: &Program,
    rt: &mut Runtime,
    stdin: &mut (dyn BufRead + Send),
    files: &dyn FileSource,
    out: &mut (dyn Write + Send),
) -> Result<i32, RuntimeError> {
    thread::scope(|scope| {
        let worker = thread::Builder::new()
            .name("awk".to_string())
            .stack_size(INTERPRETER_STACK)
            .spawn_scoped(scope, move || {
                let mut input = Input::new(stdin, files);
                Executor::new(program, rt, out).run(&mut input)
            })
            .map_err(RuntimeError::Thread)?;
        match worker.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}

/// Entries kept in each of the regex and format caches before they are
/// emptied. Patterns built from record data would otherwise grow them
/// without bound.
pub(crate) const CACHE_LIMIT: usize = 256;

/// What the driver should do after a record has been through the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    NextFile,
    Exit,
}

pub struct Executor<'a> {
    pub(crate) program: &'a Program,
    pub(crate) rt: &'a mut Runtime,
    pub(crate) out: &'a mut dyn Write,
    pub(crate) functions: FxHashMap<&'a str, &'a FuncDef>,
    pub(crate) range_active: Vec<bool>,
    pub(crate) regex_cache: FxHashMap<String, Regex>,
    pub(crate) format_cache: FxHashMap<String, Format>,
    pub(crate) exit_code: Option<i32>,
}

impl<'a> Executor<'a> {
    pub fn new(program: &'a Program, rt: &'a mut Runtime, out: &'a mut dyn Write) -> Self {
        let functions = program
            .functions
            .iter()
            .map(|f| (f.name.as_str(), f))
            .collect();
        Executor {
            program,
            rt,
            out,
            functions,
            range_active: vec![false; program.rules.len()],
            regex_cache: FxHashMap::default(),
            format_cache: FxHashMap::default(),
            exit_code: None,
        }
    }

    /// Run the whole program: BEGIN, every input record, END. Returns the
    /// exit status requested with `exit`, or 0.
    pub fn run(&mut self, input: &mut Input<'_>) -> Result<i32, RuntimeError> {
        self.run_begin()?;
        if self.exit_code.is_none() && self.program.needs_input() {
            while let Some(record) = input.next_record(self.rt)? {
                match self.run_record(&record)? {
                    Outcome::Continue => {}
                    Outcome::NextFile => input.skip_file(),
                    Outcome::Exit => break,
                }
            }
        }
        self.run_end()?;
        self.flush()?;
        Ok(self.exit_status())
    }

    pub fn run_begin(&mut self) -> Result<(), RuntimeError> {
        tracing::debug!("running BEGIN rules");
        self.run_phase(&Pattern::Begin, "BEGIN")
    }

    pub fn run_end(&mut self) -> Result<(), RuntimeError> {
        tracing::debug!("running END rules");
        self.run_phase(&Pattern::End, "END")
    }

    fn run_phase(&mut self, phase: &Pattern, name: &'static str) -> Result<(), RuntimeError> {
        let program = self.program;
        for rule in &program.rules {
            if std::mem::discriminant(&rule.pattern) != std::mem::discriminant(phase) {
                continue;
            }
            match self.exec_block(&rule.action) {
                Ok(_) => {}
                Err(Unwind::Exit(code)) => {
                    tracing::debug!(code, "exit requested");
                    self.exit_code = Some(code);
                    return Ok(());
                }
                Err(Unwind::Next) => return Err(RuntimeError::MisplacedControl("next", name)),
                Err(Unwind::NextFile) => return Err(RuntimeError::MisplacedControl("nextfile", name)),
                Err(Unwind::Error(e)) => return Err(e),
            }
        }
        Ok(())
    }

    /// Make `text` the current record and run the main rules over it.
    pub fn run_record(&mut self, text: &str) -> Result<Outcome, RuntimeError> {
        self.rt.increment_nr();
        self.rt.set_record(text)?;

        let program = self.program;
        for (i, rule) in program.rules.iter().enumerate() {
            let result = match self.match_rule(i, &rule.pattern) {
                Ok(true) => self.exec_block(&rule.action).map(|_| ()),
                Ok(false) => Ok(()),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {}
                Err(Unwind::Next) => return Ok(Outcome::Continue),
                Err(Unwind::NextFile) => return Ok(Outcome::NextFile),
                Err(Unwind::Exit(code)) => {
                    tracing::debug!(code, "exit requested");
                    self.exit_code = Some(code);
                    return Ok(Outcome::Exit);
                }
                Err(Unwind::Error(e)) => return Err(e),
            }
        }
        Ok(Outcome::Continue)
    }

    fn match_rule(&mut self, rule_idx: usize, pattern: &Pattern) -> Flow<bool> {
        match pattern {
            Pattern::Begin | Pattern::End => Ok(false),
            Pattern::All => Ok(true),
            Pattern::Regex(re) => {
                let re = self.regex(re)?;
                Ok(re.is_match(self.rt.record.text()))
            }
            Pattern::Expr(expr) => Ok(self.eval(expr)?.is_truthy()),
            Pattern::Range(start, end) => {
                if self.range_active[rule_idx] {
                    if self.eval(end)?.is_truthy() {
                        self.range_active[rule_idx] = false;
                    }
                    Ok(true)
                } else if self.eval(start)?.is_truthy() {
                    // a record can open and close the range at once
                    self.range_active[rule_idx] = !self.eval(end)?.is_truthy();
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// The status requested with `exit`, or 0.
    pub fn exit_status(&self) -> i32 {
        self.exit_code.unwrap_or(0)
    }

    pub fn flush(&mut self) -> Result<(), RuntimeError> {
        self.out.flush().map_err(RuntimeError::Output)
    }

    /// Compile a regex, caching it by its source text.
    pub(crate) fn regex(&mut self, pattern: &str) -> Result<Regex, RuntimeError> {
        if let Some(re) = self.regex_cache.get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern).map_err(|e| RuntimeError::InvalidRegex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        if self.regex_cache.len() >= CACHE_LIMIT {
            self.regex_cache.clear();
        }
        self.regex_cache.insert(pattern.to_string(), re.clone());
        Ok(re)
    }
}
