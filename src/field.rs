use regex::Regex;

use crate::error::RuntimeError;

/// How a record is cut into fields, compiled from `FS` (or a `split()`
/// separator).
///
/// Follows awk semantics:
/// - a single space splits on runs of blanks and newlines, trimming both ends;
/// - any other single character splits on that literal character;
/// - the empty string splits into individual characters;
/// - anything longer is a regular expression.
#[derive(Debug, Clone)]
pub enum FieldSplitter {
    Whitespace,
    Char(char),
    Chars,
    Regex(Regex),
}

impl FieldSplitter {
    /// Compile a separator. In paragraph mode (`RS == ""`) a newline always
    /// separates fields as well.
    pub fn new(fs: &str, paragraph: bool) -> Result<Self, RuntimeError> {
        if fs == " " {
            return Ok(FieldSplitter::Whitespace);
        }
        let mut chars = fs.chars();
        let pattern = match (chars.next(), chars.next()) {
            (None, _) => return Ok(FieldSplitter::Chars),
            (Some(c), None) if !paragraph || c == '\n' => return Ok(FieldSplitter::Char(c)),
            (Some(c), None) => format!("{}|\n", regex::escape(&c.to_string())),
            _ if paragraph => format!("(?:{})|\n", fs),
            _ => fs.to_string(),
        };
        Self::regex(&pattern)
    }

    /// A separator that is always treated as a regular expression, as a
    /// regex literal passed to `split()` is.
    pub fn regex(pattern: &str) -> Result<Self, RuntimeError> {
        Regex::new(pattern)
            .map(FieldSplitter::Regex)
            .map_err(|e| RuntimeError::InvalidRegex {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
    }

    /// Split `record` into `fields`, reusing String allocations from the
    /// previous record. An empty record has no fields.
    pub fn split_into(&self, record: &str, fields: &mut Vec<String>) {
        let mut i = 0;
        if !record.is_empty() {
            match self {
                FieldSplitter::Whitespace => {
                    for part in record.split([' ', '\t', '\n']).filter(|p| !p.is_empty()) {
                        set_field(fields, i, part);
                        i += 1;
                    }
                }
                FieldSplitter::Char(ch) => {
                    for part in record.split(*ch) {
                        set_field(fields, i, part);
                        i += 1;
                    }
                }
                FieldSplitter::Chars => {
                    let mut buf = [0u8; 4];
                    for ch in record.chars() {
                        set_field(fields, i, ch.encode_utf8(&mut buf));
                        i += 1;
                    }
                }
                FieldSplitter::Regex(re) => {
                    for part in re.split(record) {
                        set_field(fields, i, part);
                        i += 1;
                    }
                }
            }
        }
        fields.truncate(i);
    }

    pub fn split(&self, record: &str) -> Vec<String> {
        let mut fields = Vec::new();
        self.split_into(record, &mut fields);
        fields
    }
}

#[inline]
fn set_field(fields: &mut Vec<String>, i: usize, val: &str) {
    if i < fields.len() {
        fields[i].clear();
        fields[i].push_str(val);
    } else {
        fields.push(val.to_string());
    }
}

/// Split a record under field separator `fs`.
pub fn split(record: &str, fs: &str) -> Result<Vec<String>, RuntimeError> {
    Ok(FieldSplitter::new(fs, false)?.split(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_default() {
        let fields = split("  hello \t  world\n ", " ").unwrap();
        assert_eq!(fields, vec!["hello", "world"]);
    }

    #[test]
    fn comma_separator() {
        assert_eq!(split("a,b,c", ",").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn tab_separator() {
        assert_eq!(split("x\ty\tz", "\t").unwrap(), vec!["x", "y", "z"]);
    }

    #[test]
    fn empty_fields() {
        assert_eq!(split("a::b", ":").unwrap(), vec!["a", "", "b"]);
        assert_eq!(split(":a:", ":").unwrap(), vec!["", "a", ""]);
    }

    #[test]
    fn single_metachar_is_literal() {
        assert_eq!(split("a|b.c", "|").unwrap(), vec!["a", "b.c"]);
        assert_eq!(split("a.b", ".").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn multi_char_is_regex() {
        assert_eq!(split("a1b22c", "[0-9]+").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(split("a, b,c", ", *").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn invalid_regex_separator() {
        let err = split("abc", "[a").unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidRegex { .. }));
    }

    #[test]
    fn empty_record_has_no_fields() {
        assert!(split("", ",").unwrap().is_empty());
        assert!(split("   ", " ").unwrap().is_empty());
    }

    #[test]
    fn empty_separator_splits_chars() {
        assert_eq!(split("héy", "").unwrap(), vec!["h", "é", "y"]);
    }

    #[test]
    fn paragraph_mode_adds_newline() {
        let sp = FieldSplitter::new(":", true).unwrap();
        assert_eq!(sp.split("a:b\nc"), vec!["a", "b", "c"]);
    }

    #[test]
    fn split_into_reuses_buffer() {
        let sp = FieldSplitter::new(",", false).unwrap();
        let mut fields = vec!["old".to_string(); 5];
        sp.split_into("x,y", &mut fields);
        assert_eq!(fields, vec!["x", "y"]);
    }
}
