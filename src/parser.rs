use std::mem;

use rustc_hash::FxHashMap;

use crate::builtins::Builtin;
use crate::error::{Error, ParseError, Span};
use crate::lexer::{Lexer, Spanned, Token};
use crate::runtime::Special;

/// A complete awk program: rules in source order plus function definitions.
#[derive(Debug, Default)]
pub struct Program {
    pub rules: Vec<Rule>,
    pub functions: Vec<FuncDef>,
}

impl Program {
    /// Whether any rule other than BEGIN exists. A BEGIN-only program
    /// never reads input.
    pub fn needs_input(&self) -> bool {
        self.rules.iter().any(|r| !matches!(r.pattern, Pattern::Begin))
    }

    pub fn function(&self, name: &str) -> Option<&FuncDef> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A single pattern-action rule.
#[derive(Debug)]
pub struct Rule {
    pub pattern: Pattern,
    pub action: Block,
}

#[derive(Debug)]
pub enum Pattern {
    Begin,
    End,
    All,
    Regex(String),
    Expr(Expr),
    Range(Expr, Expr),
}

#[derive(Debug, Clone)]
pub struct FuncDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    /// Which parameters the body uses as arrays, directly or by passing
    /// them on to another function that does.
    pub array_params: Vec<bool>,
    pub span: Span,
}

/// A block is a list of statements.
pub type Block = Vec<Statement>;

#[derive(Debug, Clone)]
pub enum Statement {
    Print(Vec<Expr>),
    Printf(Vec<Expr>),
    If(Expr, Block, Option<Block>),
    While(Expr, Block),
    DoWhile(Block, Expr),
    For(Option<Box<Statement>>, Option<Expr>, Option<Box<Statement>>, Block),
    ForIn(Var, Var, Block),
    /// `delete a[k]`, or `delete a` when the key list is `None`.
    Delete(Var, Option<Vec<Expr>>),
    Next,
    NextFile,
    Exit(Option<Expr>),
    Return(Option<Expr>),
    Break,
    Continue,
    Block(Block),
    Expression(Expr),
}

/// A variable reference, resolved when the program is parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Var {
    Global(String),
    /// Function parameter or extra local, by position.
    Local(usize),
    Special(Special),
}

/// Something that can be assigned to.
#[derive(Debug, Clone)]
pub enum LValue {
    Var(Var),
    Field(Box<Expr>),
    ArrayRef(Var, Vec<Expr>),
}

#[derive(Debug, Clone)]
pub enum Expr {
    NumberLit(f64),
    StringLit(String),
    /// A regex literal; on its own it means `$0 ~ /re/`.
    Regex(String),
    Var(Var),
    Field(Box<Expr>),
    ArrayRef(Var, Vec<Expr>),
    ArrayIn(Vec<Expr>, Var),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
    LogicalAnd(Box<Expr>, Box<Expr>),
    LogicalOr(Box<Expr>, Box<Expr>),
    LogicalNot(Box<Expr>),
    Match(Box<Expr>, Box<Expr>),
    NotMatch(Box<Expr>, Box<Expr>),
    Assign(Box<LValue>, Box<Expr>),
    CompoundAssign(Box<LValue>, BinOp, Box<Expr>),
    Increment(Box<LValue>, bool), // bool: true = pre (++x), false = post (x++)
    Decrement(Box<LValue>, bool),
    UnaryMinus(Box<Expr>),
    UnaryPlus(Box<Expr>),
    Concat(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    BuiltinCall(Builtin, Vec<Expr>),
    FuncCall(String, Vec<Expr>),
}

impl Expr {
    fn into_lvalue(self) -> Result<LValue, Expr> {
        match self {
            Expr::Var(v) => Ok(LValue::Var(v)),
            Expr::Field(idx) => Ok(LValue::Field(idx)),
            Expr::ArrayRef(v, keys) => Ok(LValue::ArrayRef(v, keys)),
            other => Err(other),
        }
    }

    fn is_lvalue(&self) -> bool {
        matches!(self, Expr::Var(_) | Expr::Field(_) | Expr::ArrayRef(..))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Where the statements being parsed will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Begin,
    End,
    Main,
    Function,
}

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    context: Context,
    params: Vec<String>,
    loop_depth: usize,
    /// Inside an unparenthesised print list, `>` is a redirection.
    no_gt: bool,
}

/// Lex, parse and analyse a program.
pub fn parse_program(source: &str) -> Result<Program, Error> {
    let tokens = Lexer::new(source).tokenize()?;
    let program = Parser::new(tokens).parse()?;
    tracing::debug!(
        rules = program.rules.len(),
        functions = program.functions.len(),
        "program parsed"
    );
    Ok(program)
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser {
            tokens,
            pos: 0,
            context: Context::Main,
            params: Vec::new(),
            loop_depth: 0,
            no_gt: false,
        }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut program = Program::default();
        self.skip_terminators();

        while !self.at_eof() {
            match self.current() {
                Token::Function => {
                    let func = self.parse_function()?;
                    if program.function(&func.name).is_some() {
                        return Err(ParseError::new(
                            func.span,
                            format!("function {} redefined", func.name),
                        ));
                    }
                    program.functions.push(func);
                }
                Token::Begin => {
                    self.advance();
                    let action = self.parse_phase_block(Context::Begin, "BEGIN")?;
                    program.rules.push(Rule { pattern: Pattern::Begin, action });
                }
                Token::End => {
                    self.advance();
                    let action = self.parse_phase_block(Context::End, "END")?;
                    program.rules.push(Rule { pattern: Pattern::End, action });
                }
                _ => program.rules.push(self.parse_rule()?),
            }
            self.skip_terminators();
        }

        resolve_array_params(&mut program.functions);
        Ok(program)
    }

    fn parse_phase_block(&mut self, context: Context, name: &str) -> Result<Block, ParseError> {
        if !self.check(&Token::LBrace) {
            return Err(self.error(format!("{} must be followed by an action in braces", name)));
        }
        self.context = context;
        let block = self.parse_brace_block();
        self.context = Context::Main;
        block
    }

    fn parse_rule(&mut self) -> Result<Rule, ParseError> {
        if self.check(&Token::LBrace) {
            let action = self.parse_brace_block()?;
            return Ok(Rule { pattern: Pattern::All, action });
        }

        let first = self.parse_expr()?;
        let pattern = if self.check(&Token::Comma) {
            self.advance();
            self.skip_newlines();
            let second = self.parse_expr()?;
            Pattern::Range(first, second)
        } else {
            match first {
                Expr::Regex(re) => Pattern::Regex(re),
                other => Pattern::Expr(other),
            }
        };

        let action = if self.check(&Token::LBrace) {
            self.parse_brace_block()?
        } else {
            vec![Statement::Print(Vec::new())]
        };
        Ok(Rule { pattern, action })
    }

    fn parse_function(&mut self) -> Result<FuncDef, ParseError> {
        let span = self.span();
        self.advance(); // consume 'function'
        let name = match self.current() {
            Token::FuncName(n) | Token::Ident(n) => n.clone(),
            Token::Builtin(b) => {
                return Err(self.error(format!("can't redefine built-in function {}", b.name())));
            }
            other => return Err(self.error(format!("expected function name, found {}", other))),
        };
        self.advance();
        self.expect(&Token::LParen)?;

        let mut params: Vec<String> = Vec::new();
        while !self.check(&Token::RParen) {
            let param = match self.current() {
                Token::Ident(p) => p.clone(),
                other => return Err(self.error(format!("expected parameter name, found {}", other))),
            };
            if param == name {
                return Err(self.error(format!("function {}: parameter shadows function name", name)));
            }
            if Special::from_name(&param).is_some() {
                return Err(self.error(format!("can't use special variable {} as a parameter", param)));
            }
            if params.contains(&param) {
                return Err(self.error(format!("function {}: duplicate parameter {}", name, param)));
            }
            params.push(param);
            self.advance();
            if self.check(&Token::Comma) {
                self.advance();
                self.skip_newlines();
            } else if !self.check(&Token::RParen) {
                return Err(self.error(format!("expected ',' or ')', found {}", self.current())));
            }
        }
        self.advance(); // ')'
        self.skip_newlines();

        self.context = Context::Function;
        self.params = params;
        let body = self.parse_brace_block();
        self.context = Context::Main;
        let params = mem::take(&mut self.params);

        Ok(FuncDef {
            name,
            array_params: vec![false; params.len()],
            params,
            body: body?,
            span,
        })
    }

    fn parse_brace_block(&mut self) -> Result<Block, ParseError> {
        self.expect(&Token::LBrace)?;
        self.skip_terminators();

        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.at_eof() {
                return Err(self.error("unexpected end of program, missing '}'"));
            }
            stmts.push(self.parse_statement()?);
            self.skip_terminators();
        }

        self.expect(&Token::RBrace)?;
        Ok(stmts)
    }

    /// The body of a compound statement, as a block.
    fn parse_body(&mut self) -> Result<Block, ParseError> {
        self.skip_newlines();
        match self.parse_statement()? {
            Statement::Block(block) => Ok(block),
            stmt => Ok(vec![stmt]),
        }
    }

    fn parse_loop_body(&mut self) -> Result<Block, ParseError> {
        self.loop_depth += 1;
        let body = self.parse_body();
        self.loop_depth -= 1;
        body
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let stmt = match self.current() {
            Token::LBrace => return Ok(Statement::Block(self.parse_brace_block()?)),
            Token::Semicolon => {
                self.advance();
                return Ok(Statement::Block(Vec::new()));
            }
            Token::If => return self.parse_if(),
            Token::While => return self.parse_while(),
            Token::For => return self.parse_for(),
            Token::Do => self.parse_do()?,
            Token::Print => self.parse_print(false)?,
            Token::Printf => self.parse_print(true)?,
            Token::Delete => self.parse_delete()?,
            Token::Next | Token::Nextfile => {
                let stmt = if self.check(&Token::Next) { Statement::Next } else { Statement::NextFile };
                match self.context {
                    Context::Begin => return Err(self.error(format!("{} used in BEGIN action", self.current()))),
                    Context::End => return Err(self.error(format!("{} used in END action", self.current()))),
                    _ => {}
                }
                self.advance();
                stmt
            }
            Token::Exit => {
                self.advance();
                Statement::Exit(self.parse_optional_expr()?)
            }
            Token::Return => {
                if self.context != Context::Function {
                    return Err(self.error("return outside function body"));
                }
                self.advance();
                Statement::Return(self.parse_optional_expr()?)
            }
            Token::Break | Token::Continue => {
                let stmt = if self.check(&Token::Break) { Statement::Break } else { Statement::Continue };
                if self.loop_depth == 0 {
                    return Err(self.error(format!("{} outside a loop", self.current())));
                }
                self.advance();
                stmt
            }
            _ => Statement::Expression(self.parse_expr()?),
        };
        self.end_simple_statement()?;
        Ok(stmt)
    }

    fn end_simple_statement(&mut self) -> Result<(), ParseError> {
        match self.current() {
            Token::Semicolon | Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::RBrace | Token::Eof => Ok(()),
            other => Err(self.error(format!("unexpected {}", other))),
        }
    }

    fn at_simple_end(&self) -> bool {
        matches!(
            self.current(),
            Token::Semicolon | Token::Newline | Token::RBrace | Token::Eof
        )
    }

    fn at_redirection(&self) -> bool {
        matches!(self.current(), Token::Gt | Token::Append | Token::Pipe)
    }

    fn parse_optional_expr(&mut self) -> Result<Option<Expr>, ParseError> {
        if self.at_simple_end() {
            Ok(None)
        } else {
            Ok(Some(self.parse_expr()?))
        }
    }

    fn parse_print(&mut self, printf: bool) -> Result<Statement, ParseError> {
        self.advance(); // consume 'print' / 'printf'
        let args = if self.at_simple_end() || self.at_redirection() {
            Vec::new()
        } else if let Some(list) = self.try_paren_list() {
            list
        } else {
            let saved = mem::replace(&mut self.no_gt, true);
            let list = self.parse_expr_list();
            self.no_gt = saved;
            list?
        };
        if self.at_redirection() {
            return Err(self.error("output redirection is not supported"));
        }
        if printf {
            if args.is_empty() {
                return Err(self.error("printf: no format"));
            }
            Ok(Statement::Printf(args))
        } else {
            Ok(Statement::Print(args))
        }
    }

    /// `print (a, b)`: a parenthesised list that is the whole argument
    /// list. Anything else backtracks.
    fn try_paren_list(&mut self) -> Option<Vec<Expr>> {
        if !self.check(&Token::LParen) {
            return None;
        }
        let start = self.pos;
        self.advance();
        let saved = mem::replace(&mut self.no_gt, false);
        let list = self.parse_expr_list();
        self.no_gt = saved;
        let accepted = match list {
            Ok(list) if self.check(&Token::RParen) => {
                self.advance();
                (self.at_simple_end() || self.at_redirection()).then_some(list)
            }
            _ => None,
        };
        if accepted.is_none() {
            self.pos = start;
        }
        accepted
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.check(&Token::Comma) {
            self.advance();
            self.skip_newlines();
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        self.advance(); // consume 'if'
        let cond = self.parse_condition()?;
        let then_block = self.parse_body()?;

        let before_else = self.pos;
        while matches!(self.current(), Token::Newline | Token::Semicolon) {
            self.advance();
        }
        let else_block = if self.check(&Token::Else) {
            self.advance();
            Some(self.parse_body()?)
        } else {
            self.pos = before_else;
            None
        };

        Ok(Statement::If(cond, then_block, else_block))
    }

    fn parse_condition(&mut self) -> Result<Expr, ParseError> {
        self.expect(&Token::LParen)?;
        let cond = self.with_gt(|p| p.parse_expr())?;
        self.expect(&Token::RParen)?;
        Ok(cond)
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        self.advance(); // consume 'while'
        let cond = self.parse_condition()?;
        if self.check(&Token::Semicolon) {
            self.advance();
            return Ok(Statement::While(cond, Vec::new()));
        }
        let body = self.parse_loop_body()?;
        Ok(Statement::While(cond, body))
    }

    fn parse_do(&mut self) -> Result<Statement, ParseError> {
        self.advance(); // consume 'do'
        let body = self.parse_loop_body()?;
        self.skip_terminators();
        if !self.check(&Token::While) {
            return Err(self.error(format!("expected 'while' after do body, found {}", self.current())));
        }
        self.advance();
        let cond = self.parse_condition()?;
        Ok(Statement::DoWhile(body, cond))
    }

    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        self.advance(); // consume 'for'
        self.expect(&Token::LParen)?;

        if let (Token::Ident(key), Token::In, Token::Ident(array), Token::RParen) =
            (self.peek(0), self.peek(1), self.peek(2), self.peek(3))
        {
            let key = self.resolve(key);
            let array = self.resolve_array(array)?;
            for _ in 0..4 {
                self.advance();
            }
            let body = self.parse_loop_body()?;
            return Ok(Statement::ForIn(key, array, body));
        }

        let init = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(Box::new(Statement::Expression(self.with_gt(|p| p.parse_expr())?)))
        };
        self.expect(&Token::Semicolon)?;
        self.skip_newlines();

        let cond = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.with_gt(|p| p.parse_expr())?)
        };
        self.expect(&Token::Semicolon)?;
        self.skip_newlines();

        let update = if self.check(&Token::RParen) {
            None
        } else {
            Some(Box::new(Statement::Expression(self.with_gt(|p| p.parse_expr())?)))
        };
        self.expect(&Token::RParen)?;

        if self.check(&Token::Semicolon) {
            self.advance();
            return Ok(Statement::For(init, cond, update, Vec::new()));
        }
        let body = self.parse_loop_body()?;
        Ok(Statement::For(init, cond, update, body))
    }

    fn parse_delete(&mut self) -> Result<Statement, ParseError> {
        self.advance(); // consume 'delete'
        let name = match self.current() {
            Token::Ident(n) => n.clone(),
            other => return Err(self.error(format!("expected array name after delete, found {}", other))),
        };
        let array = self.resolve_array(&name)?;
        self.advance();
        if !self.check(&Token::LBracket) {
            return Ok(Statement::Delete(array, None));
        }
        self.advance();
        let keys = self.with_gt(|p| p.parse_expr_list())?;
        self.expect(&Token::RBracket)?;
        Ok(Statement::Delete(array, Some(keys)))
    }

    // --- expressions, lowest precedence first ---

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        let lhs = self.parse_ternary()?;

        let op = match self.current() {
            Token::Assign => None,
            Token::PlusAssign => Some(BinOp::Add),
            Token::MinusAssign => Some(BinOp::Sub),
            Token::StarAssign => Some(BinOp::Mul),
            Token::SlashAssign => Some(BinOp::Div),
            Token::PercentAssign => Some(BinOp::Mod),
            Token::CaretAssign => Some(BinOp::Pow),
            _ => return Ok(lhs),
        };
        let target = lhs
            .into_lvalue()
            .map_err(|_| ParseError::new(span, "invalid assignment target"))?;
        self.advance();
        self.skip_newlines();
        let rhs = self.parse_expr()?;

        Ok(match op {
            None => Expr::Assign(Box::new(target), Box::new(rhs)),
            Some(op) => Expr::CompoundAssign(Box::new(target), op, Box::new(rhs)),
        })
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_logical_or()?;
        if !self.check(&Token::Question) {
            return Ok(cond);
        }
        self.advance();
        self.skip_newlines();
        let then_expr = self.parse_expr()?;
        self.skip_newlines();
        self.expect(&Token::Colon)?;
        self.skip_newlines();
        let else_expr = self.parse_expr()?;
        Ok(Expr::Ternary(Box::new(cond), Box::new(then_expr), Box::new(else_expr)))
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_logical_and()?;
        while self.check(&Token::Or) {
            self.advance();
            self.skip_newlines();
            let right = self.parse_logical_and()?;
            left = Expr::LogicalOr(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_in()?;
        while self.check(&Token::And) {
            self.advance();
            self.skip_newlines();
            let right = self.parse_in()?;
            left = Expr::LogicalAnd(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_in(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_match()?;
        while self.check(&Token::In) {
            self.advance();
            let array = self.parse_array_name()?;
            left = Expr::ArrayIn(vec![left], array);
        }
        Ok(left)
    }

    fn parse_match(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let negate = match self.current() {
                Token::Match => false,
                Token::NotMatch => true,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = if negate {
                Expr::NotMatch(Box::new(left), Box::new(right))
            } else {
                Expr::Match(Box::new(left), Box::new(right))
            };
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_concatenation()?;
        let op = match self.current() {
            Token::Eq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt if !self.no_gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_concatenation()?;
        Ok(Expr::BinOp(Box::new(left), op, Box::new(right)))
    }

    fn parse_concatenation(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        while self.is_concat_start() {
            let right = self.parse_additive()?;
            left = Expr::Concat(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    /// Tokens that can begin the right operand of an implicit concatenation.
    /// `-` and `+` are excluded so `a -1` stays a subtraction.
    fn is_concat_start(&self) -> bool {
        matches!(
            self.current(),
            Token::Number(_)
                | Token::StringLit(_)
                | Token::Ident(_)
                | Token::FuncName(_)
                | Token::Builtin(_)
                | Token::Dollar
                | Token::LParen
                | Token::Increment
                | Token::Decrement
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::BinOp(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinOp(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.current() {
            Token::Not => {
                self.advance();
                Ok(Expr::LogicalNot(Box::new(self.parse_unary()?)))
            }
            Token::Minus => {
                self.advance();
                Ok(Expr::UnaryMinus(Box::new(self.parse_unary()?)))
            }
            Token::Plus => {
                self.advance();
                Ok(Expr::UnaryPlus(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        if !self.check(&Token::Caret) {
            return Ok(base);
        }
        self.advance();
        // right associative; the exponent may carry its own sign
        let exponent = match self.current() {
            Token::Minus | Token::Plus | Token::Not => self.parse_unary()?,
            _ => self.parse_power()?,
        };
        Ok(Expr::BinOp(Box::new(base), BinOp::Pow, Box::new(exponent)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_primary()?;
        if !expr.is_lvalue() {
            return Ok(expr);
        }
        let increment = match self.current() {
            Token::Increment => true,
            Token::Decrement => false,
            _ => return Ok(expr),
        };
        self.advance();
        let target = Box::new(self.lvalue(expr)?);
        Ok(if increment { Expr::Increment(target, false) } else { Expr::Decrement(target, false) })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current().clone();
        match token {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::NumberLit(n))
            }
            Token::StringLit(s) => {
                self.advance();
                Ok(Expr::StringLit(s))
            }
            Token::Regex(re) => {
                self.advance();
                Ok(Expr::Regex(re))
            }
            Token::Dollar => {
                self.advance();
                Ok(Expr::Field(Box::new(self.parse_field_index()?)))
            }
            Token::Increment | Token::Decrement => {
                self.advance();
                let operand = self.parse_primary()?;
                let target = Box::new(self.lvalue(operand)?);
                Ok(if token == Token::Increment {
                    Expr::Increment(target, true)
                } else {
                    Expr::Decrement(target, true)
                })
            }
            Token::Not | Token::Minus | Token::Plus => self.parse_unary(),
            Token::LParen => {
                self.advance();
                let first = self.with_gt(|p| p.parse_expr())?;
                if self.check(&Token::Comma) {
                    // (k1, k2) in array
                    let mut keys = vec![first];
                    while self.check(&Token::Comma) {
                        self.advance();
                        self.skip_newlines();
                        keys.push(self.with_gt(|p| p.parse_expr())?);
                    }
                    self.expect(&Token::RParen)?;
                    if !self.check(&Token::In) {
                        return Err(self.error(format!("expected 'in' after subscript list, found {}", self.current())));
                    }
                    self.advance();
                    let array = self.parse_array_name()?;
                    return Ok(Expr::ArrayIn(keys, array));
                }
                self.expect(&Token::RParen)?;
                Ok(first)
            }
            Token::Ident(name) => {
                self.advance();
                if self.check(&Token::LBracket) {
                    let array = self.resolve_array(&name)?;
                    self.advance();
                    let keys = self.with_gt(|p| p.parse_expr_list())?;
                    self.expect(&Token::RBracket)?;
                    Ok(Expr::ArrayRef(array, keys))
                } else {
                    Ok(Expr::Var(self.resolve(&name)))
                }
            }
            Token::FuncName(name) => {
                self.advance();
                let args = self.parse_call_args()?;
                Ok(Expr::FuncCall(name, args))
            }
            Token::Builtin(builtin) => self.parse_builtin(builtin),
            Token::Getline => Err(self.error("getline is not supported")),
            other => Err(self.error(format!("unexpected {}", other))),
        }
    }

    /// Operand of `$`: binds tighter than every binary operator.
    fn parse_field_index(&mut self) -> Result<Expr, ParseError> {
        match self.current() {
            Token::Minus => {
                self.advance();
                Ok(Expr::UnaryMinus(Box::new(self.parse_field_index()?)))
            }
            Token::Plus => {
                self.advance();
                Ok(Expr::UnaryPlus(Box::new(self.parse_field_index()?)))
            }
            Token::Not => {
                self.advance();
                Ok(Expr::LogicalNot(Box::new(self.parse_field_index()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&Token::LParen)?;
        if self.check(&Token::RParen) {
            self.advance();
            return Ok(Vec::new());
        }
        self.skip_newlines();
        let args = self.with_gt(|p| p.parse_expr_list())?;
        self.skip_newlines();
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_builtin(&mut self, builtin: Builtin) -> Result<Expr, ParseError> {
        let span = self.span();
        self.advance();
        let args = if self.check(&Token::LParen) {
            self.parse_call_args()?
        } else if builtin == Builtin::Length {
            Vec::new()
        } else {
            return Err(self.error(format!("{} requires an argument list", builtin.name())));
        };

        let (min, max) = builtin.arity();
        if args.len() < min || args.len() > max {
            return Err(ParseError::new(
                span,
                format!("{}: wrong number of arguments ({})", builtin.name(), args.len()),
            ));
        }
        match builtin {
            Builtin::Split if !is_array_name(&args[1]) => {
                return Err(ParseError::new(span, "split: second argument must be an array name"));
            }
            Builtin::Match if args.len() == 3 && !is_array_name(&args[2]) => {
                return Err(ParseError::new(span, "match: third argument must be an array name"));
            }
            Builtin::Sub | Builtin::Gsub if args.len() == 3 && !args[2].is_lvalue() => {
                return Err(ParseError::new(
                    span,
                    format!("{}: third argument must be assignable", builtin.name()),
                ));
            }
            _ => {}
        }
        Ok(Expr::BuiltinCall(builtin, args))
    }

    fn parse_array_name(&mut self) -> Result<Var, ParseError> {
        match self.current().clone() {
            Token::Ident(name) => {
                let var = self.resolve_array(&name)?;
                self.advance();
                Ok(var)
            }
            other => Err(self.error(format!("expected array name, found {}", other))),
        }
    }

    // --- names ---

    fn resolve(&self, name: &str) -> Var {
        if self.context == Context::Function
            && let Some(idx) = self.params.iter().position(|p| p == name)
        {
            return Var::Local(idx);
        }
        match Special::from_name(name) {
            Some(sp) => Var::Special(sp),
            None => Var::Global(name.to_string()),
        }
    }

    fn resolve_array(&self, name: &str) -> Result<Var, ParseError> {
        match self.resolve(name) {
            Var::Special(_) => Err(self.error(format!("can't use {} as an array", name))),
            var => Ok(var),
        }
    }

    fn lvalue(&self, expr: Expr) -> Result<LValue, ParseError> {
        expr.into_lvalue()
            .map_err(|_| self.error("invalid operand for increment or decrement"))
    }

    /// Parse with `>` meaning comparison again, as inside parentheses.
    fn with_gt<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
        let saved = mem::replace(&mut self.no_gt, false);
        let result = f(self);
        self.no_gt = saved;
        result
    }

    // --- token cursor ---

    fn current(&self) -> &Token {
        self.peek(0)
    }

    fn peek(&self, ahead: usize) -> &Token {
        self.tokens
            .get(self.pos + ahead)
            .or_else(|| self.tokens.last())
            .map_or(&Token::Eof, |t| &t.token)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or_else(Span::default, |t| t.span)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    fn check(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn expect(&mut self, token: &Token) -> Result<(), ParseError> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found {}", token, self.current())))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.span(), message)
    }

    fn skip_newlines(&mut self) {
        while self.check(&Token::Newline) {
            self.advance();
        }
    }

    fn skip_terminators(&mut self) {
        while matches!(self.current(), Token::Newline | Token::Semicolon) {
            self.advance();
        }
    }
}

fn is_array_name(expr: &Expr) -> bool {
    matches!(expr, Expr::Var(Var::Global(_) | Var::Local(_)))
}

/// Work out which parameters each function uses as arrays. A parameter
/// passed to another function's array parameter counts too, so iterate
/// to a fixpoint.
fn resolve_array_params(functions: &mut [FuncDef]) {
    let index: FxHashMap<String, usize> = functions
        .iter()
        .enumerate()
        .map(|(i, f)| (f.name.clone(), i))
        .collect();

    loop {
        let mut changed = false;
        for i in 0..functions.len() {
            let mut uses = functions[i].array_params.clone();
            {
                let mut scan = ArrayUseScan { functions: &*functions, index: &index, uses: &mut uses };
                scan.block(&functions[i].body);
            }
            if uses != functions[i].array_params {
                functions[i].array_params = uses;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

struct ArrayUseScan<'a> {
    functions: &'a [FuncDef],
    index: &'a FxHashMap<String, usize>,
    uses: &'a mut Vec<bool>,
}

impl ArrayUseScan<'_> {
    fn mark(&mut self, var: &Var) {
        if let Var::Local(idx) = var
            && let Some(slot) = self.uses.get_mut(*idx)
        {
            *slot = true;
        }
    }

    fn mark_expr(&mut self, expr: &Expr) {
        if let Expr::Var(var) = expr {
            self.mark(var);
        }
    }

    fn block(&mut self, block: &[Statement]) {
        for stmt in block {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Print(args) | Statement::Printf(args) => self.exprs(args),
            Statement::If(cond, then_block, else_block) => {
                self.expr(cond);
                self.block(then_block);
                if let Some(b) = else_block {
                    self.block(b);
                }
            }
            Statement::While(cond, body) | Statement::DoWhile(body, cond) => {
                self.expr(cond);
                self.block(body);
            }
            Statement::For(init, cond, update, body) => {
                if let Some(s) = init {
                    self.stmt(s);
                }
                if let Some(c) = cond {
                    self.expr(c);
                }
                if let Some(s) = update {
                    self.stmt(s);
                }
                self.block(body);
            }
            Statement::ForIn(_, array, body) => {
                self.mark(array);
                self.block(body);
            }
            Statement::Delete(array, keys) => {
                self.mark(array);
                if let Some(keys) = keys {
                    self.exprs(keys);
                }
            }
            Statement::Exit(e) | Statement::Return(e) => {
                if let Some(e) = e {
                    self.expr(e);
                }
            }
            Statement::Block(b) => self.block(b),
            Statement::Expression(e) => self.expr(e),
            Statement::Next | Statement::NextFile | Statement::Break | Statement::Continue => {}
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for e in exprs {
            self.expr(e);
        }
    }

    fn lvalue(&mut self, lv: &LValue) {
        match lv {
            LValue::Var(_) => {}
            LValue::Field(e) => self.expr(e),
            LValue::ArrayRef(array, keys) => {
                self.mark(array);
                self.exprs(keys);
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::NumberLit(_) | Expr::StringLit(_) | Expr::Regex(_) | Expr::Var(_) => {}
            Expr::Field(e)
            | Expr::LogicalNot(e)
            | Expr::UnaryMinus(e)
            | Expr::UnaryPlus(e) => self.expr(e),
            Expr::ArrayRef(array, keys) | Expr::ArrayIn(keys, array) => {
                self.mark(array);
                self.exprs(keys);
            }
            Expr::BinOp(l, _, r)
            | Expr::LogicalAnd(l, r)
            | Expr::LogicalOr(l, r)
            | Expr::Match(l, r)
            | Expr::NotMatch(l, r)
            | Expr::Concat(l, r) => {
                self.expr(l);
                self.expr(r);
            }
            Expr::Assign(lv, e) | Expr::CompoundAssign(lv, _, e) => {
                self.lvalue(lv);
                self.expr(e);
            }
            Expr::Increment(lv, _) | Expr::Decrement(lv, _) => self.lvalue(lv),
            Expr::Ternary(c, a, b) => {
                self.expr(c);
                self.expr(a);
                self.expr(b);
            }
            Expr::BuiltinCall(builtin, args) => {
                match builtin {
                    Builtin::Split => self.mark_expr(&args[1]),
                    Builtin::Match if args.len() == 3 => self.mark_expr(&args[2]),
                    _ => {}
                }
                self.exprs(args);
            }
            Expr::FuncCall(name, args) => {
                if let Some(&callee) = self.index.get(name) {
                    let callee_uses = &self.functions[callee].array_params;
                    for (arg, &is_array) in args.iter().zip(callee_uses) {
                        if is_array {
                            self.mark_expr(arg);
                        }
                    }
                }
                self.exprs(args);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        let tokens = Lexer::new(src).tokenize().expect("lexer error");
        Parser::new(tokens).parse().expect("parse error")
    }

    fn parse_err(src: &str) -> ParseError {
        let tokens = Lexer::new(src).tokenize().expect("lexer error");
        Parser::new(tokens).parse().expect_err("expected parse error")
    }

    fn first_action_expr(prog: &Program) -> &Expr {
        match &prog.rules[0].action[0] {
            Statement::Expression(e) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn rules_keep_source_order() {
        let prog = parse("END { print 2 }\nBEGIN { print 1 }\n/x/\n$1 > 2 { print }");
        assert!(matches!(prog.rules[0].pattern, Pattern::End));
        assert!(matches!(prog.rules[1].pattern, Pattern::Begin));
        assert!(matches!(prog.rules[2].pattern, Pattern::Regex(ref r) if r == "x"));
        assert!(matches!(prog.rules[3].pattern, Pattern::Expr(_)));
    }

    #[test]
    fn pattern_without_action_prints() {
        let prog = parse("NR == 1");
        assert!(matches!(prog.rules[0].action[..], [Statement::Print(ref args)] if args.is_empty()));
    }

    #[test]
    fn range_pattern() {
        let prog = parse("/start/, /stop/ { print }");
        assert!(matches!(prog.rules[0].pattern, Pattern::Range(Expr::Regex(_), Expr::Regex(_))));
    }

    #[test]
    fn begin_only_program_needs_no_input() {
        assert!(!parse("BEGIN { print 1 }").needs_input());
        assert!(parse("BEGIN { } END { }").needs_input());
        assert!(parse("{ print }").needs_input());
    }

    #[test]
    fn begin_requires_brace() {
        let err = parse_err("BEGIN\n{ print }");
        assert!(err.message.contains("BEGIN"));
    }

    #[test]
    fn precedence_of_arithmetic() {
        let prog = parse("BEGIN { x = 1 + 2 * 3 }");
        let Expr::Assign(_, rhs) = first_action_expr(&prog) else { panic!("not an assignment") };
        assert!(matches!(**rhs, Expr::BinOp(_, BinOp::Add, ref r) if matches!(**r, Expr::BinOp(_, BinOp::Mul, _))));
    }

    #[test]
    fn power_is_right_associative_and_binds_above_unary_minus() {
        let prog = parse("BEGIN { x = -2 ^ 3 ^ 2 }");
        let Expr::Assign(_, rhs) = first_action_expr(&prog) else { panic!("not an assignment") };
        let Expr::UnaryMinus(inner) = &**rhs else { panic!("expected unary minus, got {:?}", rhs) };
        assert!(matches!(**inner, Expr::BinOp(_, BinOp::Pow, ref r) if matches!(**r, Expr::BinOp(_, BinOp::Pow, _))));
    }

    #[test]
    fn concatenation_below_additive() {
        let prog = parse("BEGIN { x = 1 \" \" 2 + 3 }");
        let Expr::Assign(_, rhs) = first_action_expr(&prog) else { panic!("not an assignment") };
        let Expr::Concat(_, right) = &**rhs else { panic!("expected concat, got {:?}", rhs) };
        assert!(matches!(**right, Expr::BinOp(_, BinOp::Add, _)));
    }

    #[test]
    fn minus_is_subtraction_not_concatenation() {
        let prog = parse("BEGIN { x = a -1 }");
        let Expr::Assign(_, rhs) = first_action_expr(&prog) else { panic!("not an assignment") };
        assert!(matches!(**rhs, Expr::BinOp(_, BinOp::Sub, _)));
    }

    #[test]
    fn field_binds_tighter_than_minus() {
        let prog = parse("{ x = $NF-1 }");
        let Expr::Assign(_, rhs) = first_action_expr(&prog) else { panic!("not an assignment") };
        assert!(matches!(**rhs, Expr::BinOp(ref l, BinOp::Sub, _) if matches!(**l, Expr::Field(_))));
    }

    #[test]
    fn bare_regex_in_condition() {
        let prog = parse("{ if (/foo/) print }");
        let Statement::If(cond, _, _) = &prog.rules[0].action[0] else { panic!("expected if") };
        assert!(matches!(cond, Expr::Regex(r) if r == "foo"));
    }

    #[test]
    fn multi_subscript_in() {
        let prog = parse("{ if ((1, 2) in a) print }");
        let Statement::If(cond, _, _) = &prog.rules[0].action[0] else { panic!("expected if") };
        assert!(matches!(cond, Expr::ArrayIn(keys, Var::Global(name)) if keys.len() == 2 && name == "a"));
    }

    #[test]
    fn for_in_loop() {
        let prog = parse("END { for (k in seen) print k }");
        assert!(matches!(
            prog.rules[0].action[0],
            Statement::ForIn(Var::Global(ref k), Var::Global(ref a), _) if k == "k" && a == "seen"
        ));
    }

    #[test]
    fn if_else_across_lines() {
        let prog = parse("{ if (x) print 1;\nelse\n print 2 }");
        assert!(matches!(prog.rules[0].action[0], Statement::If(_, _, Some(_))));
    }

    #[test]
    fn do_while() {
        let prog = parse("BEGIN { do { i++ } while (i < 3) }");
        assert!(matches!(prog.rules[0].action[0], Statement::DoWhile(_, _)));
    }

    #[test]
    fn special_variables_resolve() {
        let prog = parse("{ NF = 2 }");
        let Expr::Assign(target, _) = first_action_expr(&prog) else { panic!("not an assignment") };
        assert!(matches!(**target, LValue::Var(Var::Special(Special::Nf))));
    }

    #[test]
    fn function_params_are_locals() {
        let prog = parse("function f(a, b) { return a + b }\nBEGIN { print f(1, 2) }");
        let f = &prog.functions[0];
        assert_eq!(f.params, vec!["a", "b"]);
        let Statement::Return(Some(Expr::BinOp(l, _, r))) = &f.body[0] else { panic!("expected return") };
        assert!(matches!(**l, Expr::Var(Var::Local(0))));
        assert!(matches!(**r, Expr::Var(Var::Local(1))));
    }

    #[test]
    fn array_params_found_transitively() {
        let prog = parse(
            "function fill(arr, n) { arr[n] = 1 }\n\
             function wrap(x, y) { fill(x, 3); y = 2 }\n\
             function splitter(s, parts) { return split(s, parts) }",
        );
        assert_eq!(prog.function("fill").unwrap().array_params, vec![true, false]);
        assert_eq!(prog.function("wrap").unwrap().array_params, vec![true, false]);
        assert_eq!(prog.function("splitter").unwrap().array_params, vec![false, true]);
    }

    #[test]
    fn print_with_parenthesised_list() {
        let prog = parse("{ print (1, 2) }");
        assert!(matches!(prog.rules[0].action[0], Statement::Print(ref args) if args.len() == 2));
        let prog = parse("{ print (1)(2) }");
        assert!(matches!(prog.rules[0].action[0], Statement::Print(ref args) if args.len() == 1));
    }

    #[test]
    fn print_gt_inside_parens_is_comparison() {
        let prog = parse("{ print (1 > 2) }");
        assert!(matches!(
            prog.rules[0].action[0],
            Statement::Print(ref args) if matches!(args[0], Expr::BinOp(_, BinOp::Gt, _))
        ));
    }

    #[test]
    fn redirection_is_rejected() {
        assert!(parse_err("{ print > \"out\" }").message.contains("redirection"));
        assert!(parse_err("{ print $1, $2 > \"out\" }").message.contains("redirection"));
        assert!(parse_err("{ print | \"sort\" }").message.contains("redirection"));
    }

    #[test]
    fn getline_is_rejected() {
        assert!(parse_err("{ getline }").message.contains("getline"));
    }

    #[test]
    fn next_in_begin_is_rejected() {
        assert!(parse_err("BEGIN { next }").message.contains("BEGIN"));
        assert!(parse_err("END { nextfile }").message.contains("END"));
    }

    #[test]
    fn return_outside_function_is_rejected() {
        assert!(parse_err("{ return 1 }").message.contains("return"));
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        assert!(parse_err("{ break }").message.contains("loop"));
    }

    #[test]
    fn invalid_assignment_target() {
        let err = parse_err("BEGIN { 1 + x = 3 }");
        assert_eq!(err.message, "invalid assignment target");
        assert!(parse_err("BEGIN { 3++ }").message.contains("unexpected"));
    }

    #[test]
    fn duplicate_parameter_is_rejected() {
        assert!(parse_err("function f(a, a) { }").message.contains("duplicate"));
        assert!(parse_err("function f(f) { }").message.contains("shadows"));
    }

    #[test]
    fn builtin_arity_checked() {
        assert!(parse_err("BEGIN { substr(\"x\") }").message.contains("substr"));
        assert!(parse_err("BEGIN { split(\"a b\", 3) }").message.contains("array"));
    }

    #[test]
    fn length_without_parens() {
        let prog = parse("length > 3");
        assert!(matches!(
            prog.rules[0].pattern,
            Pattern::Expr(Expr::BinOp(ref l, BinOp::Gt, _)) if matches!(**l, Expr::BuiltinCall(Builtin::Length, _))
        ));
    }

    #[test]
    fn error_reports_position() {
        let err = parse_err("BEGIN {\n  x = )\n}");
        assert_eq!(err.span, Span::new(2, 7));
    }

    #[test]
    fn newline_after_logical_operator_and_comma() {
        let prog = parse("{ if (a &&\n b ||\n c) print 1,\n 2 }");
        assert_eq!(prog.rules.len(), 1);
    }
}
