use std::io::{self, BufRead};

use super::RecordReader;

/// Default record reader: one record per line (`RS == "\n"`).
/// A trailing `\r` stays part of the record.
#[derive(Debug, Default)]
pub struct LineReader {
    buf: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordReader for LineReader {
    fn next_record(&mut self, reader: &mut dyn BufRead) -> io::Result<Option<String>> {
        self.buf.clear();
        if reader.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Records separated by a single byte other than newline (`RS = ";"`).
#[derive(Debug)]
pub struct ByteReader {
    sep: u8,
    buf: Vec<u8>,
}

impl ByteReader {
    pub fn new(sep: u8) -> Self {
        ByteReader { sep, buf: Vec::new() }
    }
}

impl RecordReader for ByteReader {
    fn next_record(&mut self, reader: &mut dyn BufRead) -> io::Result<Option<String>> {
        self.buf.clear();
        if reader.read_until(self.sep, &mut self.buf)? == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&self.sep) {
            self.buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Paragraph mode (`RS == ""`): records are separated by one or more blank
/// lines; leading blank lines are skipped.
#[derive(Debug, Default)]
pub struct ParagraphReader {
    line: Vec<u8>,
}

impl RecordReader for ParagraphReader {
    fn next_record(&mut self, reader: &mut dyn BufRead) -> io::Result<Option<String>> {
        let mut record = String::new();
        let mut started = false;
        loop {
            self.line.clear();
            if reader.read_until(b'\n', &mut self.line)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(self.line.strip_suffix(b"\n").unwrap_or(&self.line));
            if line.is_empty() {
                if started {
                    break;
                }
                continue;
            }
            if started {
                record.push('\n');
            }
            record.push_str(&line);
            started = true;
        }
        Ok(started.then_some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn records(mut r: impl RecordReader, data: &str) -> Vec<String> {
        let mut cursor = Cursor::new(data);
        let mut out = Vec::new();
        while let Some(rec) = r.next_record(&mut cursor).unwrap() {
            out.push(rec);
        }
        out
    }

    #[test]
    fn lines_keep_carriage_return() {
        assert_eq!(records(LineReader::new(), "a\r\nb\nc"), vec!["a\r", "b", "c"]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut cursor = Cursor::new(b"caf\xe9 x\nok\n".to_vec());
        let mut r = LineReader::new();
        assert_eq!(r.next_record(&mut cursor).unwrap().as_deref(), Some("caf\u{FFFD} x"));
        assert_eq!(r.next_record(&mut cursor).unwrap().as_deref(), Some("ok"));

        let mut cursor = Cursor::new(b"\xff\nb\n\nc\n".to_vec());
        let mut r = ParagraphReader::default();
        assert_eq!(r.next_record(&mut cursor).unwrap().as_deref(), Some("\u{FFFD}\nb"));
    }

    #[test]
    fn empty_lines_are_records() {
        assert_eq!(records(LineReader::new(), "a\n\nb\n"), vec!["a", "", "b"]);
    }

    #[test]
    fn single_byte_separator() {
        assert_eq!(records(ByteReader::new(b';'), "a;b;c\n"), vec!["a", "b", "c\n"]);
    }

    #[test]
    fn paragraphs() {
        let data = "\n\na\nb\n\n\n\nc\n\n";
        assert_eq!(records(ParagraphReader::default(), data), vec!["a\nb", "c"]);
    }
}
