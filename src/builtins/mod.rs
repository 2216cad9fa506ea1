pub mod math;
pub mod printf;
pub mod string;

pub use self::printf::{Format, FormatArg, expand_escapes, sprintf};
pub use self::string::expand_replacement;

/// Built-in functions known to the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Length,
    Substr,
    Index,
    Split,
    Sub,
    Gsub,
    Match,
    Sprintf,
    Tolower,
    Toupper,
    Int,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Atan2,
    Rand,
    Srand,
    Fflush,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "length" => Builtin::Length,
            "substr" => Builtin::Substr,
            "index" => Builtin::Index,
            "split" => Builtin::Split,
            "sub" => Builtin::Sub,
            "gsub" => Builtin::Gsub,
            "match" => Builtin::Match,
            "sprintf" => Builtin::Sprintf,
            "tolower" => Builtin::Tolower,
            "toupper" => Builtin::Toupper,
            "int" => Builtin::Int,
            "sqrt" => Builtin::Sqrt,
            "exp" => Builtin::Exp,
            "log" => Builtin::Log,
            "sin" => Builtin::Sin,
            "cos" => Builtin::Cos,
            "atan2" => Builtin::Atan2,
            "rand" => Builtin::Rand,
            "srand" => Builtin::Srand,
            "fflush" => Builtin::Fflush,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Length => "length",
            Builtin::Substr => "substr",
            Builtin::Index => "index",
            Builtin::Split => "split",
            Builtin::Sub => "sub",
            Builtin::Gsub => "gsub",
            Builtin::Match => "match",
            Builtin::Sprintf => "sprintf",
            Builtin::Tolower => "tolower",
            Builtin::Toupper => "toupper",
            Builtin::Int => "int",
            Builtin::Sqrt => "sqrt",
            Builtin::Exp => "exp",
            Builtin::Log => "log",
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
            Builtin::Atan2 => "atan2",
            Builtin::Rand => "rand",
            Builtin::Srand => "srand",
            Builtin::Fflush => "fflush",
        }
    }

    /// Accepted argument counts (min, max).
    pub fn arity(self) -> (usize, usize) {
        match self {
            Builtin::Length => (0, 1),
            Builtin::Substr => (2, 3),
            Builtin::Index => (2, 2),
            Builtin::Split => (2, 3),
            Builtin::Sub | Builtin::Gsub => (2, 3),
            Builtin::Match => (2, 3),
            Builtin::Sprintf => (1, usize::MAX),
            Builtin::Tolower | Builtin::Toupper => (1, 1),
            Builtin::Int | Builtin::Sqrt | Builtin::Exp | Builtin::Log => (1, 1),
            Builtin::Sin | Builtin::Cos => (1, 1),
            Builtin::Atan2 => (2, 2),
            Builtin::Rand => (0, 0),
            Builtin::Srand => (0, 1),
            Builtin::Fflush => (0, 1),
        }
    }
}

/// Scan the longest numeric prefix of `s` after leading blanks.
/// Returns the value and the byte offset just past the number.
fn scan_number(s: &str) -> Option<(f64, usize)> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c') {
        i += 1;
    }
    let start = i;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mut has_digit = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        has_digit = true;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            has_digit = true;
        }
    }
    if !has_digit {
        return None;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    s[start..i].parse::<f64>().ok().map(|n| (n, i))
}

/// Coerce a string to a number (awk semantics: leading numeric prefix is parsed,
/// non-numeric strings become 0).
pub fn to_number(s: &str) -> f64 {
    scan_number(s).map_or(0.0, |(n, _)| n)
}

/// True when the whole string, ignoring surrounding blanks, is a number.
/// Input-derived text that passes this test becomes a strnum.
pub fn looks_numeric(s: &str) -> bool {
    match scan_number(s) {
        Some((_, end)) => s[end..].trim_matches([' ', '\t', '\n', '\r']).is_empty(),
        None => false,
    }
}

/// Convert a number to its string form: integral values print as integers,
/// everything else goes through `fmt` (CONVFMT or OFMT).
pub fn format_number(n: f64, fmt: &str) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan".to_string() } else { "nan".to_string() };
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n == n.trunc() && n.abs() < 1e16 {
        return format!("{}", n as i64);
    }
    match sprintf(fmt, &[n]) {
        Ok(s) => s,
        Err(_) => sprintf("%.6g", &[n]).unwrap_or_else(|_| n.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_prefix() {
        assert_eq!(to_number("42"), 42.0);
        assert_eq!(to_number("  3.5abc"), 3.5);
        assert_eq!(to_number("1e3x"), 1000.0);
        assert_eq!(to_number("1e"), 1.0);
        assert_eq!(to_number("-.5"), -0.5);
        assert_eq!(to_number("abc"), 0.0);
        assert_eq!(to_number(""), 0.0);
        assert_eq!(to_number("inf"), 0.0);
        assert_eq!(to_number("."), 0.0);
    }

    #[test]
    fn strnum_detection() {
        assert!(looks_numeric("10"));
        assert!(looks_numeric(" -3.25e2 "));
        assert!(looks_numeric("+.5"));
        assert!(!looks_numeric("10x"));
        assert!(!looks_numeric(""));
        assert!(!looks_numeric("  "));
        assert!(!looks_numeric("0x10"));
    }

    #[test]
    fn number_to_string() {
        assert_eq!(format_number(3.0, "%.6g"), "3");
        assert_eq!(format_number(-12.0, "%.6g"), "-12");
        assert_eq!(format_number(0.1 + 0.2, "%.6g"), "0.3");
        assert_eq!(format_number(3.14159265, "%.2f"), "3.14");
        assert_eq!(format_number(1e20, "%.6g"), "1e+20");
        assert_eq!(format_number(f64::INFINITY, "%.6g"), "inf");
    }

    #[test]
    fn builtin_names_round_trip() {
        for name in ["length", "substr", "gsub", "sprintf", "atan2", "fflush"] {
            assert_eq!(Builtin::from_name(name).map(Builtin::name), Some(name));
        }
        assert_eq!(Builtin::from_name("getline"), None);
    }
}
