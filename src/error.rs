use thiserror::Error;

use crate::applet::{EXIT_FAILURE, EXIT_USAGE};

/// Source location: line and column (both 1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Span {
    #[must_use]
    pub fn new(line: usize, col: usize) -> Self {
        Span { line, col }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Malformed token in the program text.
#[derive(Debug, Error, PartialEq)]
#[error("syntax error at {span}: {message}")]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

impl LexError {
    #[must_use]
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        LexError { span, message: message.into() }
    }
}

/// Grammar violation found while building the AST.
#[derive(Debug, Error, PartialEq)]
#[error("parse error at {span}: {message}")]
pub struct ParseError {
    pub span: Span,
    pub message: String,
}

impl ParseError {
    #[must_use]
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        ParseError { span, message: message.into() }
    }
}

/// Bad `printf`-style format string.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    #[error("unknown conversion '%{0}' in format")]
    UnknownConversion(char),
    #[error("incomplete format specification at end of format")]
    Incomplete,
    #[error("field width or precision {0} too large")]
    WidthTooLarge(f64),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("division by zero in %")]
    ModuloByZero,
    #[error("invalid regex /{pattern}/: {message}")]
    InvalidRegex { pattern: String, message: String },
    #[error("function call nesting exceeds {0} levels")]
    RecursionLimit(usize),
    #[error("calling undefined function {0}")]
    UndefinedFunction(String),
    #[error("function {name} called with {given} args, accepts only {accepted}")]
    TooManyArgs { name: String, given: usize, accepted: usize },
    #[error("can't use scalar {0} as array")]
    ScalarAsArray(String),
    #[error("can't use array {0} in scalar context")]
    ArrayAsScalar(String),
    #[error("trying to access out of range field {0}")]
    NegativeField(i64),
    #[error("field index {0} too large")]
    FieldTooLarge(f64),
    #[error("{0} used in {1} action")]
    MisplacedControl(&'static str, &'static str),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("{path}: {source}")]
    Input { path: String, source: std::io::Error },
    #[error("write error: {0}")]
    Output(#[source] std::io::Error),
    #[error("cannot start interpreter thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// Any failure the awk applet can report, with its exit-code class.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    /// Lex and parse failures are usage-class; everything else is a failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Lex(_) | Error::Parse(_) => EXIT_USAGE,
            Error::Runtime(_) => EXIT_FAILURE,
        }
    }
}
