pub mod line;
pub mod regex_rs;

use std::io::{self, BufRead, Cursor};

use crate::applet::FileSource;
use crate::builtins::expand_escapes;
use crate::cli::split_assignment;
use crate::error::RuntimeError;
use crate::runtime::{Runtime, Value};

/// Strategy for reading one record from a byte stream.
pub trait RecordReader {
    fn next_record(&mut self, reader: &mut dyn BufRead) -> io::Result<Option<String>>;

    /// Input this reader has buffered but not yet turned into records,
    /// handed back when `RS` changes mid-stream.
    fn take_pending(&mut self) -> Option<String> {
        None
    }
}

/// The reader for a record separator:
/// - `"\n"` reads lines;
/// - `""` reads blank-line separated paragraphs;
/// - any other single character is a literal separator;
/// - anything longer is a regular expression.
pub fn reader_for(rs: &str) -> Result<Box<dyn RecordReader>, RuntimeError> {
    if rs == "\n" {
        return Ok(Box::new(line::LineReader::new()));
    }
    if rs.is_empty() {
        return Ok(Box::new(line::ParagraphReader::default()));
    }
    let mut chars = rs.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(Box::new(line::ByteReader::new(c as u8))),
        (Some(c), None) => Ok(Box::new(regex_rs::RegexReader::new(&regex::escape(&c.to_string()))?)),
        _ => Ok(Box::new(regex_rs::RegexReader::new(rs)?)),
    }
}

enum Source<'a> {
    Stdin,
    File(Box<dyn BufRead + 'a>),
}

/// Iterates over records from the operands in `ARGV`, awk style: file
/// operands are read in turn (`-` is stdin), `name=value` operands are
/// applied when reached, and stdin is read when no file operand exists.
///
/// `ARGV` and `ARGC` are consulted lazily, so changes made in BEGIN apply.
pub struct Input<'a> {
    stdin: &'a mut dyn BufRead,
    files: &'a dyn FileSource,
    source: Option<Source<'a>>,
    name: String,
    next_arg: usize,
    opened_file: bool,
    reader: Option<Box<dyn RecordReader>>,
    reader_rs: String,
}

impl<'a> Input<'a> {
    pub fn new(stdin: &'a mut dyn BufRead, files: &'a dyn FileSource) -> Self {
        Input {
            stdin,
            files,
            source: None,
            name: String::new(),
            next_arg: 1,
            opened_file: false,
            reader: None,
            reader_rs: String::new(),
        }
    }

    /// Read the next record under the current `RS`. Returns `None` when
    /// every operand is exhausted.
    pub fn next_record(&mut self, rt: &mut Runtime) -> Result<Option<String>, RuntimeError> {
        loop {
            if self.source.is_none() && !self.open_next(rt)? {
                return Ok(None);
            }
            self.sync_reader(rt.rs())?;

            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };
            let got = match &mut self.source {
                Some(Source::Stdin) => reader.next_record(&mut *self.stdin),
                Some(Source::File(file)) => reader.next_record(file.as_mut()),
                None => Ok(None),
            };
            match got {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => self.skip_file(),
                Err(source) => {
                    return Err(RuntimeError::Input { path: self.display_name(), source });
                }
            }
        }
    }

    /// Abandon the current source (`nextfile`).
    pub fn skip_file(&mut self) {
        self.source = None;
        if let Some(reader) = self.reader.as_mut() {
            reader.take_pending();
        }
    }

    fn display_name(&self) -> String {
        if self.name.is_empty() { "-".to_string() } else { self.name.clone() }
    }

    /// Rebuild the record reader when `RS` changed since the last record.
    fn sync_reader(&mut self, rs: &str) -> Result<(), RuntimeError> {
        if self.reader.is_some() && self.reader_rs == rs {
            return Ok(());
        }
        let pending = self.reader.as_mut().and_then(|r| r.take_pending());
        self.reader = Some(reader_for(rs)?);
        self.reader_rs.clear();
        self.reader_rs.push_str(rs);
        if let Some(text) = pending {
            // the old reader had consumed its source to the end
            self.source = Some(Source::File(Box::new(Cursor::new(text.into_bytes()))));
        }
        Ok(())
    }

    fn open_next(&mut self, rt: &mut Runtime) -> Result<bool, RuntimeError> {
        let argc = rt.global("ARGC").to_number().max(0.0) as usize;
        while self.next_arg < argc {
            let idx = self.next_arg;
            self.next_arg += 1;
            let operand = match rt.global_array("ARGV").and_then(|a| a.get(&idx.to_string())) {
                Some(v) => v.to_str_with(rt.convfmt()).into_owned(),
                None => continue,
            };
            if operand.is_empty() {
                continue;
            }
            if let Some((name, value)) = split_assignment(&operand) {
                tracing::trace!(name, "operand assignment");
                rt.set_global(name, Value::from_input(expand_escapes(value).0))?;
                continue;
            }

            self.opened_file = true;
            let source = if operand == "-" {
                Source::Stdin
            } else {
                let file = self.files.open(&operand).map_err(|source| RuntimeError::Input {
                    path: operand.clone(),
                    source,
                })?;
                Source::File(file)
            };
            tracing::debug!(file = %operand, "input source opened");
            self.start(source, &operand, rt);
            return Ok(true);
        }

        if self.opened_file {
            return Ok(false);
        }
        self.opened_file = true;
        tracing::debug!("reading standard input");
        self.start(Source::Stdin, "", rt);
        Ok(true)
    }

    fn start(&mut self, source: Source<'a>, name: &str, rt: &mut Runtime) {
        self.source = Some(source);
        self.name.clear();
        self.name.push_str(name);
        rt.set_filename(name);
        rt.reset_fnr();
    }
}
