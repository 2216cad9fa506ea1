//! awkbox: an awk engine and a `printf` formatter behind a small applet
//! dispatch table.

pub mod action;
pub mod applet;
pub mod builtins;
pub mod cli;
pub mod error;
pub mod field;
pub mod input;
pub mod lexer;
pub mod parser;
pub mod runtime;
