use crate::builtins::Builtin;
use crate::error::{LexError, Span};

/// Token types for the awk language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    StringLit(String),
    Regex(String),

    // Names
    Ident(String),
    FuncName(String), // identifier immediately followed by '('
    Builtin(Builtin),

    // Keywords
    Begin,
    End,
    Function,
    If,
    Else,
    While,
    For,
    Do,
    In,
    Break,
    Continue,
    Next,
    Nextfile,
    Exit,
    Return,
    Delete,
    Print,
    Printf,
    Getline,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,          // ^ or **
    Assign,
    PlusAssign,     // +=
    MinusAssign,    // -=
    StarAssign,     // *=
    SlashAssign,    // /=
    PercentAssign,  // %=
    CaretAssign,    // ^= or **=
    Increment,      // ++
    Decrement,      // --
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Append,      // >>
    Pipe,        // |
    Match,       // ~
    NotMatch,    // !~
    Not,         // !
    And,         // &&
    Or,          // ||
    Question,
    Colon,
    Dollar,

    // Delimiters
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Newline,

    // Special
    Eof,
}

impl Token {
    /// Whether this token can end an operand, which makes a following `/`
    /// a division rather than the start of a regex literal.
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Number(_)
                | Token::StringLit(_)
                | Token::Regex(_)
                | Token::Ident(_)
                | Token::Builtin(_)
                | Token::RParen
                | Token::RBracket
                | Token::Dollar
                | Token::Increment
                | Token::Decrement
        )
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Token::Number(n) => return write!(f, "number {}", n),
            Token::StringLit(s) => return write!(f, "string \"{}\"", s),
            Token::Regex(r) => return write!(f, "regex /{}/", r),
            Token::Ident(s) | Token::FuncName(s) => return write!(f, "'{}'", s),
            Token::Builtin(b) => return write!(f, "'{}'", b.name()),
            Token::Begin => "BEGIN",
            Token::End => "END",
            Token::Function => "function",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::For => "for",
            Token::Do => "do",
            Token::In => "in",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::Next => "next",
            Token::Nextfile => "nextfile",
            Token::Exit => "exit",
            Token::Return => "return",
            Token::Delete => "delete",
            Token::Print => "print",
            Token::Printf => "printf",
            Token::Getline => "getline",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Caret => "^",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::PercentAssign => "%=",
            Token::CaretAssign => "^=",
            Token::Increment => "++",
            Token::Decrement => "--",
            Token::Eq => "==",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::Append => ">>",
            Token::Pipe => "|",
            Token::Match => "~",
            Token::NotMatch => "!~",
            Token::Not => "!",
            Token::And => "&&",
            Token::Or => "||",
            Token::Question => "?",
            Token::Colon => ":",
            Token::Dollar => "$",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Semicolon => ";",
            Token::Comma => ",",
            Token::Newline => "newline",
            Token::Eof => "end of program",
        };
        f.write_str(text)
    }
}

/// A token together with the position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens: Vec<Spanned> = Vec::new();

        loop {
            self.skip_whitespace();
            let span = self.span();
            let Some(ch) = self.peek() else {
                tokens.push(Spanned { token: Token::Eof, span });
                break;
            };

            // Comments
            if ch == '#' {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.bump();
                }
                continue;
            }

            let token = match ch {
                '\n' => { self.bump(); Token::Newline }
                '{' => { self.bump(); Token::LBrace }
                '}' => { self.bump(); Token::RBrace }
                '(' => { self.bump(); Token::LParen }
                ')' => { self.bump(); Token::RParen }
                '[' => { self.bump(); Token::LBracket }
                ']' => { self.bump(); Token::RBracket }
                ';' => { self.bump(); Token::Semicolon }
                ',' => { self.bump(); Token::Comma }
                '?' => { self.bump(); Token::Question }
                ':' => { self.bump(); Token::Colon }
                '~' => { self.bump(); Token::Match }
                '$' => { self.bump(); Token::Dollar }
                '+' => {
                    self.bump();
                    if self.eat('=') {
                        Token::PlusAssign
                    } else if self.eat('+') {
                        Token::Increment
                    } else {
                        Token::Plus
                    }
                }
                '-' => {
                    self.bump();
                    if self.eat('=') {
                        Token::MinusAssign
                    } else if self.eat('-') {
                        Token::Decrement
                    } else {
                        Token::Minus
                    }
                }
                '*' => {
                    self.bump();
                    if self.eat('*') {
                        if self.eat('=') { Token::CaretAssign } else { Token::Caret }
                    } else if self.eat('=') {
                        Token::StarAssign
                    } else {
                        Token::Star
                    }
                }
                '^' => {
                    self.bump();
                    if self.eat('=') { Token::CaretAssign } else { Token::Caret }
                }
                '%' => {
                    self.bump();
                    if self.eat('=') { Token::PercentAssign } else { Token::Percent }
                }
                '/' => {
                    let regex_context = tokens.last().is_none_or(|t| !t.token.ends_operand());
                    if regex_context {
                        self.read_regex(span)?
                    } else {
                        self.bump();
                        if self.eat('=') { Token::SlashAssign } else { Token::Slash }
                    }
                }
                '=' => {
                    self.bump();
                    if self.eat('=') { Token::Eq } else { Token::Assign }
                }
                '!' => {
                    self.bump();
                    if self.eat('=') {
                        Token::Ne
                    } else if self.eat('~') {
                        Token::NotMatch
                    } else {
                        Token::Not
                    }
                }
                '<' => {
                    self.bump();
                    if self.eat('=') { Token::Le } else { Token::Lt }
                }
                '>' => {
                    self.bump();
                    if self.eat('=') {
                        Token::Ge
                    } else if self.eat('>') {
                        Token::Append
                    } else {
                        Token::Gt
                    }
                }
                '&' => {
                    self.bump();
                    if self.eat('&') {
                        Token::And
                    } else {
                        return Err(LexError::new(span, "unexpected character '&'"));
                    }
                }
                '|' => {
                    self.bump();
                    if self.eat('|') { Token::Or } else { Token::Pipe }
                }
                '"' => self.read_string(span)?,
                _ if ch.is_ascii_digit() => self.read_number(span)?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.read_number(span)?,
                _ if ch.is_ascii_alphabetic() || ch == '_' => self.read_word(),
                _ => {
                    return Err(LexError::new(span, format!("unexpected character '{}'", ch)));
                }
            };

            tokens.push(Spanned { token, span });
        }

        Ok(tokens)
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.col)
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Skips blanks and backslash-newline continuations; newlines themselves
    /// are tokens.
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.bump();
            } else if ch == '\\' && self.peek_at(1) == Some('\n') {
                self.bump();
                self.bump();
            } else if ch == '\\' && self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n') {
                self.bump();
                self.bump();
                self.bump();
            } else {
                break;
            }
        }
    }

    fn read_regex(&mut self, start: Span) -> Result<Token, LexError> {
        self.bump(); // opening /
        let mut pattern = String::new();
        let mut in_bracket = false;
        loop {
            let Some(ch) = self.peek() else {
                return Err(LexError::new(start, "unterminated regex"));
            };
            match ch {
                '\n' => return Err(LexError::new(start, "newline in regex")),
                '/' if !in_bracket => {
                    self.bump();
                    return Ok(Token::Regex(pattern));
                }
                '\\' => {
                    self.bump();
                    match self.bump() {
                        Some('/') => pattern.push('/'),
                        Some('\n') | None => return Err(LexError::new(start, "unterminated regex")),
                        Some(other) => {
                            pattern.push('\\');
                            pattern.push(other);
                        }
                    }
                }
                '[' if !in_bracket => {
                    in_bracket = true;
                    pattern.push(ch);
                    self.bump();
                    // A leading ']' (or '^]') is literal inside a bracket expression.
                    if self.peek() == Some('^') {
                        pattern.push('^');
                        self.bump();
                    }
                    if self.peek() == Some(']') {
                        pattern.push(']');
                        self.bump();
                    }
                }
                '[' if in_bracket && self.peek_at(1) == Some(':') => {
                    // character class such as [:alpha:]
                    while let Some(c) = self.bump() {
                        pattern.push(c);
                        if c == ']' && pattern.ends_with(":]") {
                            break;
                        }
                        if c == '\n' {
                            return Err(LexError::new(start, "newline in regex"));
                        }
                    }
                }
                ']' if in_bracket => {
                    in_bracket = false;
                    pattern.push(ch);
                    self.bump();
                }
                _ => {
                    pattern.push(ch);
                    self.bump();
                }
            }
        }
    }

    fn read_string(&mut self, start: Span) -> Result<Token, LexError> {
        self.bump(); // opening "
        let mut s = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return Err(LexError::new(start, "unterminated string"));
            };
            match ch {
                '"' => return Ok(Token::StringLit(s)),
                '\n' => return Err(LexError::new(start, "unterminated string")),
                '\\' => {
                    let esc_span = self.span();
                    let Some(escaped) = self.bump() else {
                        return Err(LexError::new(start, "unterminated string"));
                    };
                    match escaped {
                        'n' => s.push('\n'),
                        't' => s.push('\t'),
                        'r' => s.push('\r'),
                        '\\' => s.push('\\'),
                        '"' => s.push('"'),
                        '/' => s.push('/'),
                        'a' => s.push('\x07'),
                        'b' => s.push('\x08'),
                        'f' => s.push('\x0c'),
                        'v' => s.push('\x0b'),
                        '\n' => {}
                        '0'..='7' => {
                            let mut code = escaped.to_digit(8).unwrap_or(0);
                            for _ in 0..2 {
                                match self.peek().and_then(|c| c.to_digit(8)) {
                                    Some(d) => {
                                        code = code * 8 + d;
                                        self.bump();
                                    }
                                    None => break,
                                }
                            }
                            s.push(byte_char(code));
                        }
                        'x' => {
                            let mut code = 0;
                            let mut digits = 0;
                            while digits < 2 {
                                match self.peek().and_then(|c| c.to_digit(16)) {
                                    Some(d) => {
                                        code = code * 16 + d;
                                        digits += 1;
                                        self.bump();
                                    }
                                    None => break,
                                }
                            }
                            if digits == 0 {
                                return Err(LexError::new(esc_span, "\\x used with no following hex digits"));
                            }
                            s.push(byte_char(code));
                        }
                        _ => {
                            s.push('\\');
                            s.push(escaped);
                        }
                    }
                }
                _ => s.push(ch),
            }
        }
    }

    fn read_number(&mut self, start: Span) -> Result<Token, LexError> {
        if self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X'))
            && self.peek_at(2).is_some_and(|c| c.is_ascii_hexdigit())
        {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_hexdigit()) {
                digits.push(c);
                self.bump();
            }
            return u64::from_str_radix(&digits, 16)
                .map(|n| Token::Number(n as f64))
                .map_err(|_| LexError::new(start, format!("invalid hex number 0x{}", digits)));
        }

        let mut text = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
            text.push(c);
            self.bump();
        }
        if self.peek() == Some('.') {
            text.push('.');
            self.bump();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
                text.push(c);
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digit_at {
                    if let Some(c) = self.bump() {
                        text.push(c);
                    }
                }
                while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
                    text.push(c);
                    self.bump();
                }
            }
        }
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| LexError::new(start, format!("invalid number: {}", text)))
    }

    fn read_word(&mut self) -> Token {
        let mut s = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric() || *c == '_') {
            s.push(c);
            self.bump();
        }
        match s.as_str() {
            "BEGIN" => Token::Begin,
            "END" => Token::End,
            "function" | "func" => Token::Function,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "for" => Token::For,
            "do" => Token::Do,
            "in" => Token::In,
            "break" => Token::Break,
            "continue" => Token::Continue,
            "next" => Token::Next,
            "nextfile" => Token::Nextfile,
            "exit" => Token::Exit,
            "return" => Token::Return,
            "delete" => Token::Delete,
            "print" => Token::Print,
            "printf" => Token::Printf,
            "getline" => Token::Getline,
            _ => {
                if let Some(b) = Builtin::from_name(&s) {
                    Token::Builtin(b)
                } else if self.peek() == Some('(') {
                    Token::FuncName(s)
                } else {
                    Token::Ident(s)
                }
            }
        }
    }
}

/// Map an escape's byte value to a char (values above 0x7f map to Latin-1).
fn byte_char(code: u32) -> char {
    char::from((code & 0xff) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn simple_print() {
        assert_eq!(
            kinds("{ print $1 }"),
            vec![
                Token::LBrace,
                Token::Print,
                Token::Dollar,
                Token::Number(1.0),
                Token::RBrace,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn regex_pattern() {
        assert_eq!(
            kinds("/error/ { print }"),
            vec![
                Token::Regex("error".to_string()),
                Token::LBrace,
                Token::Print,
                Token::RBrace,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn slash_after_operand_is_division() {
        let toks = kinds("a / b / c");
        assert_eq!(toks.iter().filter(|t| **t == Token::Slash).count(), 2);
        let toks = kinds("(x) / 2");
        assert!(toks.contains(&Token::Slash));
        let toks = kinds("$1/2");
        assert!(toks.contains(&Token::Slash));
        let toks = kinds("i++ / 2");
        assert!(toks.contains(&Token::Slash));
    }

    #[test]
    fn slash_after_operator_opens_regex() {
        let toks = kinds("x ~ /a+b/");
        assert!(toks.contains(&Token::Regex("a+b".to_string())));
        let toks = kinds("split(s, a, /,/)");
        assert!(toks.contains(&Token::Regex(",".to_string())));
    }

    #[test]
    fn regex_escaped_slash_and_bracket() {
        assert!(kinds(r"/a\/b/").contains(&Token::Regex("a/b".to_string())));
        assert!(kinds(r"/[/]x/").contains(&Token::Regex("[/]x".to_string())));
        assert!(kinds(r"/a\.b/").contains(&Token::Regex(r"a\.b".to_string())));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\tb\n\"q\"\101\x41""#)[0], Token::StringLit("a\tb\n\"q\"AA".to_string()));
        assert_eq!(kinds(r#""\.""#)[0], Token::StringLit("\\.".to_string()));
    }

    #[test]
    fn bad_hex_escape_is_error() {
        let err = Lexer::new(r#"BEGIN { s = "\xZZ" }"#).tokenize().unwrap_err();
        assert!(err.message.contains("hex"));
    }

    #[test]
    fn unterminated_string_reports_start() {
        let err = Lexer::new("BEGIN {\n  s = \"abc\n}").tokenize().unwrap_err();
        assert_eq!(err.span, Span::new(2, 7));
        assert_eq!(err.message, "unterminated string");
    }

    #[test]
    fn unterminated_regex() {
        let err = Lexer::new("/abc").tokenize().unwrap_err();
        assert_eq!(err.message, "unterminated regex");
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("1.5e3")[0], Token::Number(1500.0));
        assert_eq!(kinds(".25")[0], Token::Number(0.25));
        assert_eq!(kinds("0x1F")[0], Token::Number(31.0));
    }

    #[test]
    fn increment_decrement() {
        let toks = kinds("{ i++; j-- }");
        assert!(toks.contains(&Token::Increment));
        assert!(toks.contains(&Token::Decrement));
    }

    #[test]
    fn compound_assign() {
        let toks = kinds("{ x += 1; y -= 2; z *= 3; w /= 4; m %= 5; p ^= 2; q **= 2 }");
        assert!(toks.contains(&Token::PlusAssign));
        assert!(toks.contains(&Token::MinusAssign));
        assert!(toks.contains(&Token::StarAssign));
        assert!(toks.contains(&Token::SlashAssign));
        assert!(toks.contains(&Token::PercentAssign));
        assert_eq!(toks.iter().filter(|t| **t == Token::CaretAssign).count(), 2);
    }

    #[test]
    fn function_names_and_builtins() {
        let toks = kinds("foo(1) bar (2) length substr(s, 1)");
        assert_eq!(toks[0], Token::FuncName("foo".to_string()));
        assert!(toks.contains(&Token::Ident("bar".to_string())));
        assert!(toks.contains(&Token::Builtin(Builtin::Length)));
        assert!(toks.contains(&Token::Builtin(Builtin::Substr)));
    }

    #[test]
    fn keywords() {
        let toks = kinds("if else for while do in delete printf next nextfile exit return func");
        for kw in [
            Token::If, Token::Else, Token::For, Token::While, Token::Do, Token::In,
            Token::Delete, Token::Printf, Token::Next, Token::Nextfile, Token::Exit,
            Token::Return, Token::Function,
        ] {
            assert!(toks.contains(&kw), "missing {:?}", kw);
        }
    }

    #[test]
    fn line_continuation_and_comments() {
        let toks = kinds("x = 1 \\\n + 2 # trailing\n");
        assert_eq!(
            toks,
            vec![
                Token::Ident("x".to_string()),
                Token::Assign,
                Token::Number(1.0),
                Token::Plus,
                Token::Number(2.0),
                Token::Newline,
                Token::Eof,
            ]
        );
    }
}
