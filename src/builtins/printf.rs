use std::borrow::Cow;

use crate::error::FormatError;

/// Largest field width or precision a conversion may ask for.
pub const MAX_WIDTH: usize = 1 << 20;

/// A value that can be consumed by a format conversion.
///
/// awk values and plain command-line strings both implement this, so the
/// `printf` statement, `sprintf()`, number-to-string conversion and the
/// standalone `printf` applet share one engine.
pub trait FormatArg {
    fn to_number(&self) -> f64;
    fn to_text(&self) -> Cow<'_, str>;
    /// `%c` prints a number as the character with that code point and a
    /// string as its first character.
    fn is_number(&self) -> bool;
}

impl FormatArg for f64 {
    fn to_number(&self) -> f64 {
        *self
    }
    fn to_text(&self) -> Cow<'_, str> {
        Cow::Owned(super::format_number(*self, "%.6g"))
    }
    fn is_number(&self) -> bool {
        true
    }
}

impl FormatArg for String {
    fn to_number(&self) -> f64 {
        super::to_number(self)
    }
    fn to_text(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
    fn is_number(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Flags {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Count {
    Fixed(usize),
    Star,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Conv {
    Signed,
    Unsigned,
    Octal,
    HexLower,
    HexUpper,
    Fixed,
    ExpLower,
    ExpUpper,
    GeneralLower,
    GeneralUpper,
    Str,
    Char,
    Escaped,
}

#[derive(Debug, Clone, PartialEq)]
struct Spec {
    flags: Flags,
    width: Option<Count>,
    precision: Option<Count>,
    conv: Conv,
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Literal(String),
    Spec(Spec),
}

/// What a single application of a format did with its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub consumed: usize,
    /// A `\c` inside a `%b` argument asked for all further output to stop.
    pub stopped: bool,
}

/// A compiled format string.
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    pieces: Vec<Piece>,
}

impl Format {
    /// Parse `fmt` left to right into literal runs and conversion specs.
    pub fn compile(fmt: &str) -> Result<Self, FormatError> {
        let chars: Vec<char> = fmt.chars().collect();
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < chars.len() {
            if chars[i] != '%' {
                literal.push(chars[i]);
                i += 1;
                continue;
            }
            i += 1;
            if chars.get(i) == Some(&'%') {
                literal.push('%');
                i += 1;
                continue;
            }

            let mut flags = Flags::default();
            while let Some(&c) = chars.get(i) {
                match c {
                    '-' => flags.left = true,
                    '+' => flags.plus = true,
                    ' ' => flags.space = true,
                    '#' => flags.alt = true,
                    '0' => flags.zero = true,
                    _ => break,
                }
                i += 1;
            }

            let width = parse_count(&chars, &mut i)?;
            let precision = if chars.get(i) == Some(&'.') {
                i += 1;
                Some(parse_count(&chars, &mut i)?.unwrap_or(Count::Fixed(0)))
            } else {
                None
            };

            // C length modifiers carry no meaning here.
            while matches!(chars.get(i), Some('h' | 'l' | 'L' | 'q' | 'j' | 'z' | 't')) {
                i += 1;
            }

            let conv = match chars.get(i) {
                None => return Err(FormatError::Incomplete),
                Some('d' | 'i') => Conv::Signed,
                Some('u') => Conv::Unsigned,
                Some('o') => Conv::Octal,
                Some('x') => Conv::HexLower,
                Some('X') => Conv::HexUpper,
                Some('f') => Conv::Fixed,
                Some('e') => Conv::ExpLower,
                Some('E') => Conv::ExpUpper,
                Some('g') => Conv::GeneralLower,
                Some('G') => Conv::GeneralUpper,
                Some('s') => Conv::Str,
                Some('c') => Conv::Char,
                Some('b') => Conv::Escaped,
                Some(&other) => return Err(FormatError::UnknownConversion(other)),
            };
            i += 1;

            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            pieces.push(Piece::Spec(Spec { flags, width, precision, conv }));
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        Ok(Format { pieces })
    }

    /// True if at least one conversion reads an argument.
    #[must_use]
    pub fn consumes_args(&self) -> bool {
        self.pieces.iter().any(|p| matches!(p, Piece::Spec(_)))
    }

    /// Render with `args`; missing arguments read as empty/zero.
    pub fn render<A: FormatArg>(&self, args: &[A]) -> Result<String, FormatError> {
        let mut out = String::new();
        self.render_into(args, &mut out)?;
        Ok(out)
    }

    /// Append one application of the format to `out`. Fails only when a
    /// `*` argument asks for a width or precision above [`MAX_WIDTH`].
    pub fn render_into<A: FormatArg>(&self, args: &[A], out: &mut String) -> Result<Progress, FormatError> {
        let mut next = 0;
        let take = |next: &mut usize| {
            let arg = args.get(*next);
            *next += 1;
            arg
        };

        for piece in &self.pieces {
            let spec = match piece {
                Piece::Literal(s) => {
                    out.push_str(s);
                    continue;
                }
                Piece::Spec(spec) => spec,
            };

            let mut flags = spec.flags;
            let width = match spec.width {
                None => 0,
                Some(Count::Fixed(w)) => w,
                Some(Count::Star) => {
                    let w = take(&mut next).map_or(0.0, |a| a.to_number()).trunc();
                    if w < 0.0 {
                        flags.left = true;
                    }
                    star_count(w.abs())?
                }
            };
            let precision = match spec.precision {
                None => None,
                Some(Count::Fixed(p)) => Some(p),
                Some(Count::Star) => {
                    let p = take(&mut next).map_or(0.0, |a| a.to_number()).trunc();
                    if p < 0.0 { None } else { Some(star_count(p)?) }
                }
            };
            let arg = take(&mut next);
            let number = || arg.map_or(0.0, |a| a.to_number());

            let body = match spec.conv {
                Conv::Signed => fmt_signed(number(), &flags, width, precision),
                Conv::Unsigned => fmt_unsigned(number(), 10, false, &flags, width, precision),
                Conv::Octal => fmt_unsigned(number(), 8, false, &flags, width, precision),
                Conv::HexLower => fmt_unsigned(number(), 16, false, &flags, width, precision),
                Conv::HexUpper => fmt_unsigned(number(), 16, true, &flags, width, precision),
                Conv::Fixed
                | Conv::ExpLower
                | Conv::ExpUpper
                | Conv::GeneralLower
                | Conv::GeneralUpper => fmt_float(number(), spec.conv, &flags, width, precision),
                Conv::Str => {
                    let text = arg.map_or(Cow::Borrowed(""), |a| a.to_text());
                    truncate_chars(&text, precision)
                }
                Conv::Char => match arg {
                    Some(a) if a.is_number() => {
                        let code = a.to_number().trunc();
                        if code >= 0.0 {
                            char::from_u32(code as u32).map(String::from).unwrap_or_default()
                        } else {
                            String::new()
                        }
                    }
                    Some(a) => a.to_text().chars().next().map(String::from).unwrap_or_default(),
                    None => String::new(),
                },
                Conv::Escaped => {
                    let text = arg.map_or(Cow::Borrowed(""), |a| a.to_text());
                    let (expanded, stop) = expand_escapes(&text);
                    let body = truncate_chars(&expanded, precision);
                    if stop {
                        out.push_str(&pad(&body, width, flags.left));
                        return Ok(Progress { consumed: next.min(args.len()), stopped: true });
                    }
                    body
                }
            };

            // numeric formatters have already zero-filled to `width`
            out.push_str(&pad(&body, width, flags.left));
        }

        Ok(Progress { consumed: next.min(args.len()), stopped: false })
    }
}

/// Compile and render in one step.
pub fn sprintf<A: FormatArg>(fmt: &str, args: &[A]) -> Result<String, FormatError> {
    Format::compile(fmt)?.render(args)
}

fn parse_count(chars: &[char], i: &mut usize) -> Result<Option<Count>, FormatError> {
    if chars.get(*i) == Some(&'*') {
        *i += 1;
        return Ok(Some(Count::Star));
    }
    let start = *i;
    let mut n: usize = 0;
    while let Some(d) = chars.get(*i).and_then(|c| c.to_digit(10)) {
        n = n.saturating_mul(10).saturating_add(d as usize);
        *i += 1;
    }
    if n > MAX_WIDTH {
        return Err(FormatError::WidthTooLarge(n as f64));
    }
    Ok(if *i > start { Some(Count::Fixed(n)) } else { None })
}

/// A non-negative `*` argument as a width or precision.
fn star_count(n: f64) -> Result<usize, FormatError> {
    if n > MAX_WIDTH as f64 {
        return Err(FormatError::WidthTooLarge(n));
    }
    Ok(n as usize)
}

fn pad(body: &str, width: usize, left: bool) -> String {
    let len = body.chars().count();
    if len >= width {
        return body.to_string();
    }
    let fill = " ".repeat(width - len);
    if left { format!("{}{}", body, fill) } else { format!("{}{}", fill, body) }
}

fn truncate_chars(s: &str, precision: Option<usize>) -> String {
    match precision {
        Some(p) => s.chars().take(p).collect(),
        None => s.to_string(),
    }
}

fn sign_prefix(negative: bool, flags: &Flags) -> &'static str {
    if negative {
        "-"
    } else if flags.plus {
        "+"
    } else if flags.space {
        " "
    } else {
        ""
    }
}

/// Join prefix and digits, zero-filling between them up to `width`.
fn assemble(prefix: &str, digits: &str, width: usize, zero_fill: bool) -> String {
    let len = prefix.chars().count() + digits.chars().count();
    if zero_fill && len < width {
        format!("{}{}{}", prefix, "0".repeat(width - len), digits)
    } else {
        format!("{}{}", prefix, digits)
    }
}

fn non_finite(v: f64, upper: bool, flags: &Flags) -> String {
    let word = if v.is_nan() { "nan" } else { "inf" };
    let word = if upper { word.to_uppercase() } else { word.to_string() };
    format!("{}{}", sign_prefix(v.is_sign_negative() && !v.is_nan(), flags), word)
}

fn apply_int_precision(mut digits: String, precision: Option<usize>) -> String {
    if let Some(p) = precision {
        if p == 0 && digits == "0" {
            digits.clear();
        } else if digits.len() < p {
            digits = format!("{}{}", "0".repeat(p - digits.len()), digits);
        }
    }
    digits
}

fn fmt_signed(v: f64, flags: &Flags, width: usize, precision: Option<usize>) -> String {
    if !v.is_finite() {
        return non_finite(v, false, flags);
    }
    let n = v.trunc();
    let digits = apply_int_precision(format!("{:.0}", n.abs()), precision);
    let sign = sign_prefix(n < 0.0, flags);
    let zero_fill = flags.zero && !flags.left && precision.is_none();
    assemble(sign, &digits, width, zero_fill)
}

fn fmt_unsigned(
    v: f64,
    base: u32,
    upper: bool,
    flags: &Flags,
    width: usize,
    precision: Option<usize>,
) -> String {
    if !v.is_finite() {
        return non_finite(v, upper, flags);
    }
    let n = v.trunc();
    let magnitude: u64 = if n < 0.0 { (n as i64) as u64 } else { n as u64 };
    let raw = match (base, upper) {
        (8, _) => format!("{:o}", magnitude),
        (16, false) => format!("{:x}", magnitude),
        (16, true) => format!("{:X}", magnitude),
        _ => magnitude.to_string(),
    };
    let mut digits = apply_int_precision(raw, precision);
    let mut prefix = "";
    if flags.alt {
        match base {
            8 if !digits.starts_with('0') => digits.insert(0, '0'),
            16 if magnitude != 0 => prefix = if upper { "0X" } else { "0x" },
            _ => {}
        }
    }
    let zero_fill = flags.zero && !flags.left && precision.is_none();
    assemble(prefix, &digits, width, zero_fill)
}

fn fmt_float(v: f64, conv: Conv, flags: &Flags, width: usize, precision: Option<usize>) -> String {
    let upper = matches!(conv, Conv::ExpUpper | Conv::GeneralUpper);
    if !v.is_finite() {
        return non_finite(v, upper, flags);
    }
    let p = precision.unwrap_or(6);
    let abs = v.abs();
    let digits = match conv {
        Conv::Fixed => fixed_string(abs, p, flags.alt),
        Conv::ExpLower | Conv::ExpUpper => exp_string(abs, p, upper, flags.alt),
        _ => general_string(abs, p, upper, flags.alt),
    };
    let sign = sign_prefix(v.is_sign_negative(), flags);
    assemble(sign, &digits, width, flags.zero && !flags.left)
}

fn fixed_string(abs: f64, p: usize, alt: bool) -> String {
    let mut s = format!("{:.*}", p, abs);
    if alt && p == 0 {
        s.push('.');
    }
    s
}

/// C-style exponent form: at least two exponent digits, explicit sign.
fn exp_string(abs: f64, p: usize, upper: bool, alt: bool) -> String {
    let raw = format!("{:.*e}", p, abs);
    let (mantissa, exp) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let mut mantissa = mantissa.to_string();
    if alt && p == 0 {
        mantissa.push('.');
    }
    format!(
        "{}{}{}{:02}",
        mantissa,
        if upper { 'E' } else { 'e' },
        if exp < 0 { '-' } else { '+' },
        exp.abs()
    )
}

fn general_string(abs: f64, p: usize, upper: bool, alt: bool) -> String {
    let p = if p == 0 { 1 } else { p };
    let exponent = if abs == 0.0 {
        0
    } else {
        let raw = format!("{:.*e}", p - 1, abs);
        raw.split_once('e').and_then(|(_, e)| e.parse::<i32>().ok()).unwrap_or(0)
    };
    let s = if exponent >= -4 && exponent < p as i32 {
        format!("{:.*}", (p as i32 - 1 - exponent) as usize, abs)
    } else {
        exp_string(abs, p - 1, upper, false)
    };
    if alt {
        if s.contains('.') { s } else { format_alt_point(s) }
    } else {
        strip_fraction_zeros(&s)
    }
}

fn format_alt_point(s: String) -> String {
    match s.find(['e', 'E']) {
        Some(pos) => format!("{}.{}", &s[..pos], &s[pos..]),
        None => format!("{}.", s),
    }
}

fn strip_fraction_zeros(s: &str) -> String {
    let (mantissa, exp) = match s.find(['e', 'E']) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, ""),
    };
    if !mantissa.contains('.') {
        return s.to_string();
    }
    let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", trimmed, exp)
}

/// Expand backslash escapes as `%b` and the `printf` applet's format do.
/// The flag is set when `\c` asked for output to stop.
pub fn expand_escapes(s: &str) -> (String, bool) {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' || i + 1 >= chars.len() {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        let c = chars[i];
        i += 1;
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'c' => return (out, true),
            '0'..='7' => {
                // \0ddd and \ddd both read up to three octal digits in total
                // after an optional leading zero.
                let max = if c == '0' { 3 } else { 2 };
                let mut code = c.to_digit(8).unwrap_or(0);
                let mut taken = 0;
                while taken < max {
                    match chars.get(i).and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            i += 1;
                            taken += 1;
                        }
                        None => break,
                    }
                }
                out.push(char::from((code & 0xff) as u8));
            }
            'x' => {
                let mut code = 0;
                let mut taken = 0;
                while taken < 2 {
                    match chars.get(i).and_then(|d| d.to_digit(16)) {
                        Some(d) => {
                            code = code * 16 + d;
                            i += 1;
                            taken += 1;
                        }
                        None => break,
                    }
                }
                if taken == 0 {
                    out.push_str("\\x");
                } else {
                    out.push(char::from((code & 0xff) as u8));
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    (out, false)
}
