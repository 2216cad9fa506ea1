//! String built-ins that need no interpreter state.

/// `length(s)`: number of characters.
pub fn length(s: &str) -> usize {
    s.chars().count()
}

/// `substr(s, m[, n])` with POSIX rounding: characters from position
/// round(m) up to (but excluding) round(m) + round(n), clamped to the string.
pub fn substr(s: &str, m: f64, n: Option<f64>) -> String {
    let len = s.chars().count() as f64;
    let start = round_half_even(m);
    let end = match n {
        Some(n) => {
            let n = round_half_even(n);
            if n.is_nan() { return String::new() }
            start + n
        }
        None => f64::INFINITY,
    };
    if start.is_nan() {
        return String::new();
    }
    let start = start.max(1.0);
    let end = end.min(len + 1.0);
    if end <= start {
        return String::new();
    }
    s.chars()
        .skip(start as usize - 1)
        .take((end - start) as usize)
        .collect()
}

fn round_half_even(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
        r - x.signum()
    } else {
        r
    }
}

/// `index(s, t)`: 1-based character position of `t` in `s`, 0 if absent.
pub fn index(s: &str, t: &str) -> usize {
    if t.is_empty() {
        return 0;
    }
    match s.find(t) {
        Some(byte_pos) => s[..byte_pos].chars().count() + 1,
        None => 0,
    }
}

pub fn tolower(s: &str) -> String {
    s.to_lowercase()
}

pub fn toupper(s: &str) -> String {
    s.to_uppercase()
}

/// Expand a `sub`/`gsub` replacement for one match: `&` is the matched
/// text, `\&` a literal ampersand and `\\` a single backslash.
pub fn expand_replacement(repl: &str, matched: &str, out: &mut String) {
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some('&') => {
                    out.push('&');
                    chars.next();
                }
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                _ => out.push('\\'),
            },
            '&' => out.push_str(matched),
            _ => out.push(c),
        }
    }
}
