use std::io::{self, BufRead};

use regex::Regex;

use crate::error::RuntimeError;

use super::RecordReader;

/// Record reader that splits input on a regex record separator (a
/// multi-character `RS`).
///
/// On first call per source, buffers the entire source and then yields one
/// record per call. Empty separator matches are ignored.
#[derive(Debug)]
pub struct RegexReader {
    pattern: Regex,
    text: String,
    pos: usize,
    loaded: bool,
}

impl RegexReader {
    pub fn new(pattern: &str) -> Result<Self, RuntimeError> {
        let re = Regex::new(pattern).map_err(|e| RuntimeError::InvalidRegex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(RegexReader {
            pattern: re,
            text: String::new(),
            pos: 0,
            loaded: false,
        })
    }
}

impl RecordReader for RegexReader {
    fn next_record(&mut self, reader: &mut dyn BufRead) -> io::Result<Option<String>> {
        if !self.loaded {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            self.text = String::from_utf8_lossy(&bytes).into_owned();
            // a single trailing newline does not start another record
            if self.text.ends_with('\n') {
                self.text.pop();
            }
            self.pos = 0;
            self.loaded = true;
        }

        if self.pos >= self.text.len() {
            self.loaded = false;
            self.text.clear();
            return Ok(None);
        }

        let rest = &self.text[self.pos..];
        let sep = self.pattern.find_iter(rest).find(|m| !m.is_empty());
        let record = match sep {
            Some(m) => {
                let rec = rest[..m.start()].to_string();
                self.pos += m.end();
                rec
            }
            None => {
                let rec = rest.to_string();
                self.pos = self.text.len();
                rec
            }
        };
        Ok(Some(record))
    }

    fn take_pending(&mut self) -> Option<String> {
        if !self.loaded {
            return None;
        }
        self.loaded = false;
        let rest = self.text.split_off(self.pos);
        self.text.clear();
        Some(rest)
    }
}
