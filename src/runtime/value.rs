use std::borrow::Cow;
use std::cmp::Ordering;

use crate::builtins::{self, FormatArg};

/// A dynamically typed awk scalar.
///
/// `StrNum` is text that came from input and looks numeric; its number is
/// parsed once when the value is created. An uninitialised value is the
/// empty strnum, so it reads as `""` and `0` and compares numerically
/// against numbers but as a string against strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Str(String),
    StrNum(String, f64),
}

impl Default for Value {
    fn default() -> Self {
        Value::StrNum(String::new(), 0.0)
    }
}

impl Value {
    pub fn from_number(n: f64) -> Self {
        Value::Num(n)
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn from_bool(b: bool) -> Self {
        Value::Num(if b { 1.0 } else { 0.0 })
    }

    /// Classify text that came from outside the program (fields, `split`
    /// elements, `-v` assignments, `ARGV`, `ENVIRON`).
    pub fn from_input(s: impl Into<String>) -> Self {
        let s = s.into();
        if builtins::looks_numeric(&s) {
            let n = builtins::to_number(&s);
            Value::StrNum(s, n)
        } else {
            Value::Str(s)
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Num(n) | Value::StrNum(_, n) => *n,
            Value::Str(s) => builtins::to_number(s),
        }
    }

    /// String form; numbers go through `convfmt` unless integral.
    pub fn to_str_with(&self, convfmt: &str) -> Cow<'_, str> {
        match self {
            Value::Num(n) => Cow::Owned(builtins::format_number(*n, convfmt)),
            Value::Str(s) | Value::StrNum(s, _) => Cow::Borrowed(s),
        }
    }

    pub fn into_string_with(self, convfmt: &str) -> String {
        match self {
            Value::Num(n) => builtins::format_number(n, convfmt),
            Value::Str(s) | Value::StrNum(s, _) => s,
        }
    }

    /// Whether comparisons treat this value as a number.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Num(_) | Value::StrNum(..))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Num(n) | Value::StrNum(_, n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    /// Numeric when both sides are numeric, string comparison otherwise.
    pub fn compare(&self, other: &Value, convfmt: &str) -> Ordering {
        if self.is_numeric() && other.is_numeric() {
            let (a, b) = (self.to_number(), other.to_number());
            return a.partial_cmp(&b).unwrap_or_else(|| {
                // NaN sorts after everything, equal to itself
                a.is_nan().cmp(&b.is_nan())
            });
        }
        self.to_str_with(convfmt).cmp(&other.to_str_with(convfmt))
    }
}

/// A value viewed as a format argument, with the CONVFMT used for `%s`.
pub struct ValueArg<'a> {
    pub value: &'a Value,
    pub convfmt: &'a str,
}

impl FormatArg for ValueArg<'_> {
    fn to_number(&self) -> f64 {
        self.value.to_number()
    }

    fn to_text(&self) -> Cow<'_, str> {
        self.value.to_str_with(self.convfmt)
    }

    fn is_number(&self) -> bool {
        self.value.is_numeric()
    }
}
