use crate::field::FieldSplitter;

/// The current input record: `$0` and its fields, kept consistent.
///
/// Setting the text re-splits the fields; setting a field or `NF` rebuilds
/// the text from the fields joined by `OFS`.
#[derive(Debug, Default)]
pub struct Record {
    text: String,
    fields: Vec<String>,
}

impl Record {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn nf(&self) -> usize {
        self.fields.len()
    }

    /// Field `idx` (1-based); fields past `NF` read as empty.
    pub fn field(&self, idx: usize) -> &str {
        if idx == 0 {
            return &self.text;
        }
        self.fields.get(idx - 1).map_or("", String::as_str)
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn set_text(&mut self, text: &str, splitter: &FieldSplitter) {
        self.text.clear();
        self.text.push_str(text);
        splitter.split_into(&self.text, &mut self.fields);
    }

    /// Assign `$idx` for `idx >= 1`, padding with empty fields past `NF`.
    pub fn set_field(&mut self, idx: usize, value: &str, ofs: &str) {
        debug_assert!(idx >= 1);
        if self.fields.len() < idx {
            self.fields.resize(idx, String::new());
        }
        let slot = &mut self.fields[idx - 1];
        slot.clear();
        slot.push_str(value);
        self.rebuild(ofs);
    }

    /// Assign `NF`: truncate or pad the fields, then rebuild `$0`.
    pub fn set_nf(&mut self, nf: usize, ofs: &str) {
        self.fields.resize(nf, String::new());
        self.rebuild(ofs);
    }

    fn rebuild(&mut self, ofs: &str) {
        self.text = self.fields.join(ofs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str) -> Record {
        let mut r = Record::default();
        r.set_text(text, &FieldSplitter::Whitespace);
        r
    }

    #[test]
    fn set_text_splits() {
        let r = record("  a b   c ");
        assert_eq!(r.nf(), 3);
        assert_eq!(r.field(0), "  a b   c ");
        assert_eq!(r.field(2), "b");
        assert_eq!(r.field(9), "");
    }

    #[test]
    fn set_field_rebuilds_text() {
        let mut r = record("a b c");
        r.set_field(2, "X", " ");
        assert_eq!(r.text(), "a X c");
        assert_eq!(r.nf(), 3);
    }

    #[test]
    fn set_field_past_nf_pads() {
        let mut r = record("a b");
        r.set_field(5, "e", "-");
        assert_eq!(r.nf(), 5);
        assert_eq!(r.text(), "a-b---e");
        assert_eq!(r.field(3), "");
        assert_eq!(r.field(4), "");
    }

    #[test]
    fn set_nf_truncates_and_extends() {
        let mut r = record("a b c d");
        r.set_nf(2, ",");
        assert_eq!(r.text(), "a,b");
        r.set_nf(4, ",");
        assert_eq!(r.text(), "a,b,,");
    }
}
