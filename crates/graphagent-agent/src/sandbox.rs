//! Restricted arithmetic evaluator.
//!
//! Expressions are parsed with a grammar wider than what may be evaluated
//! (names, calls, attribute access, subscripts, string and collection
//! literals all produce tree nodes), then the whole tree is walked and the
//! first disallowed node rejects the expression. Only numeric literals,
//! parentheses, unary `+`/`-` and `+ - * / // % ** ^` survive validation.
//! Evaluation has no names, built-ins or I/O in scope.

use std::fmt;

use thiserror::Error;

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxError {
    #[error("unsafe expression: {kind} is not allowed")]
    UnsafeExpression { kind: &'static str },

    #[error("malformed expression: {0}")]
    Malformed(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("result is not a finite number")]
    NotFinite,
}

/// Parse, validate and evaluate `expr`, returning the formatted result.
pub fn evaluate(expr: &str) -> Result<String, SandboxError> {
    let tree = parse(expr)?;
    validate(&tree)?;
    Ok(eval(&tree)?.to_string())
}

/// A numeric value: integers stay exact until an operation needs a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn finite(self) -> Result<Self, SandboxError> {
        match self {
            Number::Float(f) if !f.is_finite() => Err(SandboxError::NotFinite),
            n => Ok(n),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(v) if v.fract() == 0.0 && v.abs() < 1e16 => write!(f, "{:.1}", v),
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

/// Parse tree. Only `Number`, `Unary` and `Binary` pass validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Number),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Name(String),
    Str(String),
    Call(Box<Expr>, Vec<Expr>),
    Attribute(Box<Expr>, String),
    Subscript(Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
}

impl Expr {
    fn kind(&self) -> &'static str {
        match self {
            Expr::Number(_) => "number",
            Expr::Unary(..) => "unary operator",
            Expr::Binary(..) => "binary operator",
            Expr::Name(_) => "name",
            Expr::Str(_) => "string literal",
            Expr::Call(..) => "function call",
            Expr::Attribute(..) => "attribute access",
            Expr::Subscript(..) => "subscript",
            Expr::List(_) => "list literal",
            Expr::Tuple(_) => "tuple literal",
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Number(_) | Expr::Name(_) | Expr::Str(_) => vec![],
            Expr::Unary(_, e) | Expr::Attribute(e, _) => vec![e.as_ref()],
            Expr::Binary(_, l, r) | Expr::Subscript(l, r) => vec![l.as_ref(), r.as_ref()],
            Expr::Call(f, args) => std::iter::once(f.as_ref()).chain(args.iter()).collect(),
            Expr::List(items) | Expr::Tuple(items) => items.iter().collect(),
        }
    }
}

/// Walk every node of the tree, rejecting the first disallowed kind.
pub fn validate(expr: &Expr) -> Result<(), SandboxError> {
    match expr {
        Expr::Number(_) | Expr::Unary(..) | Expr::Binary(..) => {}
        other => {
            return Err(SandboxError::UnsafeExpression { kind: other.kind() });
        }
    }
    for child in expr.children() {
        validate(child)?;
    }
    Ok(())
}

// ── Tokenizer ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Number),
    Ident(String),
    Str(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Caret,
    Slash,
    DoubleSlash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    /// Any other character (comparison, bitwise, assignment, ...).
    Other(char),
}

impl Token {
    fn is_disallowed(&self) -> bool {
        matches!(
            self,
            Token::Ident(_)
                | Token::Str(_)
                | Token::LBracket
                | Token::RBracket
                | Token::Comma
                | Token::Dot
                | Token::Other(_)
        )
    }

    fn disallowed_kind(&self) -> &'static str {
        match self {
            Token::Ident(_) => "name",
            Token::Str(_) => "string literal",
            Token::LBracket | Token::RBracket => "list literal",
            Token::Comma => "tuple literal",
            Token::Dot => "attribute access",
            _ => "operator",
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, SandboxError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let (num, next) = lex_number(&chars, i)?;
                tokens.push(Token::Num(num));
                i = next;
            }
            '.' if chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                let (num, next) = lex_number(&chars, i)?;
                tokens.push(Token::Num(num));
                i = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                let text: String = chars[start..i.min(chars.len())].iter().collect();
                i += 1; // closing quote (or end of input)
                tokens.push(Token::Str(text));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::DoubleStar);
                i += 2;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            _ => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '^' => Token::Caret,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    other => Token::Other(other),
                });
                i += 1;
            }
        }
    }

    Ok(tokens)
}

/// Lex `123`, `1.5`, `.5`, `2.`, `1e3`, `2.5E-2` starting at `start`.
fn lex_number(chars: &[char], start: usize) -> Result<(Number, usize), SandboxError> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().collect();
    let num = if is_float {
        text.parse::<f64>()
            .map(Number::Float)
            .map_err(|_| SandboxError::Malformed(format!("bad number literal '{}'", text)))?
    } else {
        text.parse::<i64>()
            .map(Number::Int)
            .map_err(|_| SandboxError::Overflow)?
    };
    Ok((num, i))
}

// ── Parser ───────────────────────────────────────────────────────

/// Nesting limit for parentheses, brackets, signs and exponents.
pub const MAX_DEPTH: usize = 200;

/// Token limit; bounds the depth of operator chains built by the loops.
pub const MAX_TOKENS: usize = 1024;

/// Parse `input` into a tree without checking which node kinds are allowed.
///
/// When the text is not a well-formed expression but contains tokens that
/// could never be allowed, the error is `UnsafeExpression` rather than
/// `Malformed`.
pub fn parse(input: &str) -> Result<Expr, SandboxError> {
    let tokens = tokenize(input)?;
    if tokens.len() > MAX_TOKENS {
        return Err(SandboxError::Malformed(format!(
            "expression longer than {} tokens",
            MAX_TOKENS
        )));
    }
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };

    let result = parser.parse_expression().and_then(|expr| match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(SandboxError::Malformed(format!("unexpected {:?}", tok))),
    });

    match result {
        Err(SandboxError::Malformed(msg)) => match tokens.iter().find(|t| t.is_disallowed()) {
            Some(tok) => Err(SandboxError::UnsafeExpression {
                kind: tok.disallowed_kind(),
            }),
            None => Err(SandboxError::Malformed(msg)),
        },
        other => other,
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), SandboxError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(SandboxError::Malformed(format!(
                "expected {:?}, found {:?}",
                expected,
                self.peek()
            )))
        }
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SandboxError>,
    ) -> Result<T, SandboxError> {
        if self.depth >= MAX_DEPTH {
            return Err(SandboxError::Malformed(
                "expression nested too deeply".into(),
            ));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn parse_expression(&mut self) -> Result<Expr, SandboxError> {
        self.nested(Self::parse_sum)
    }

    // expression := term (('+' | '-') term)*
    fn parse_sum(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // term := unary (('*' | '/' | '//' | '%') unary)*
    fn parse_term(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::DoubleSlash) => BinaryOp::FloorDiv,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // unary := ('+' | '-') unary | power
    fn parse_unary(&mut self) -> Result<Expr, SandboxError> {
        if self.eat(&Token::Minus) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr::Unary(UnaryOp::Minus, Box::new(operand)));
        }
        if self.eat(&Token::Plus) {
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr::Unary(UnaryOp::Plus, Box::new(operand)));
        }
        self.parse_power()
    }

    // power := postfix (('**' | '^') unary)?
    fn parse_power(&mut self) -> Result<Expr, SandboxError> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::DoubleStar) || self.eat(&Token::Caret) {
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    // postfix := atom ('(' args ')' | '.' name | '[' expression ']')*
    fn parse_postfix(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    self.pos += 1;
                    let args = self.parse_sequence(&Token::RParen)?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.advance() {
                        Some(Token::Ident(name)) => {
                            expr = Expr::Attribute(Box::new(expr), name.clone());
                        }
                        other => {
                            return Err(SandboxError::Malformed(format!(
                                "expected attribute name, found {:?}",
                                other
                            )))
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_expression()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Subscript(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, SandboxError> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(Expr::Number(*n)),
            Some(Token::Ident(name)) => Ok(Expr::Name(name.clone())),
            Some(Token::Str(s)) => Ok(Expr::Str(s.clone())),
            Some(Token::LParen) => {
                let mut items = self.parse_sequence(&Token::RParen)?;
                if items.len() == 1 && !matches!(self.tokens.get(self.pos - 2), Some(Token::Comma)) {
                    Ok(items.remove(0))
                } else {
                    Ok(Expr::Tuple(items))
                }
            }
            Some(Token::LBracket) => Ok(Expr::List(self.parse_sequence(&Token::RBracket)?)),
            Some(tok) => Err(SandboxError::Malformed(format!("unexpected {:?}", tok))),
            None => Err(SandboxError::Malformed("unexpected end of expression".into())),
        }
    }

    /// Comma-separated expressions up to and including `close`.
    fn parse_sequence(&mut self, close: &Token) -> Result<Vec<Expr>, SandboxError> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.parse_expression()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }
}

// ── Evaluator ────────────────────────────────────────────────────

/// Evaluate a validated tree. Disallowed nodes are rejected here too.
pub fn eval(expr: &Expr) -> Result<Number, SandboxError> {
    match expr {
        Expr::Number(n) => n.finite(),
        Expr::Unary(op, inner) => {
            let value = eval(inner)?;
            match (op, value) {
                (UnaryOp::Plus, v) => Ok(v),
                (UnaryOp::Minus, Number::Int(i)) => {
                    i.checked_neg().map(Number::Int).ok_or(SandboxError::Overflow)
                }
                (UnaryOp::Minus, Number::Float(f)) => Ok(Number::Float(-f)),
            }
        }
        Expr::Binary(op, lhs, rhs) => binary(*op, eval(lhs)?, eval(rhs)?)?.finite(),
        other => Err(SandboxError::UnsafeExpression { kind: other.kind() }),
    }
}

fn binary(op: BinaryOp, lhs: Number, rhs: Number) -> Result<Number, SandboxError> {
    use Number::{Float, Int};

    match (op, lhs, rhs) {
        (BinaryOp::Div, l, r) => {
            let r = r.as_f64();
            if r == 0.0 {
                return Err(SandboxError::DivisionByZero);
            }
            Ok(Float(l.as_f64() / r))
        }
        (BinaryOp::Pow, Int(base), Int(exp)) => int_pow(base, exp),
        (BinaryOp::Pow, l, r) => {
            let (base, exp) = (l.as_f64(), r.as_f64());
            if base == 0.0 && exp < 0.0 {
                return Err(SandboxError::DivisionByZero);
            }
            Ok(Float(base.powf(exp)))
        }
        (op, Int(l), Int(r)) => int_op(op, l, r),
        (op, l, r) => float_op(op, l.as_f64(), r.as_f64()),
    }
}

fn int_op(op: BinaryOp, l: i64, r: i64) -> Result<Number, SandboxError> {
    let value = match op {
        BinaryOp::Add => l.checked_add(r),
        BinaryOp::Sub => l.checked_sub(r),
        BinaryOp::Mul => l.checked_mul(r),
        BinaryOp::FloorDiv | BinaryOp::Mod if r == 0 => {
            return Err(SandboxError::DivisionByZero)
        }
        BinaryOp::FloorDiv => l.checked_div(r).map(|q| {
            // Round toward negative infinity.
            if l % r != 0 && ((l < 0) != (r < 0)) {
                q - 1
            } else {
                q
            }
        }),
        BinaryOp::Mod => l.checked_rem(r).map(|m| {
            // Result takes the sign of the divisor.
            if m != 0 && ((m < 0) != (r < 0)) {
                m + r
            } else {
                m
            }
        }),
        BinaryOp::Div | BinaryOp::Pow => unreachable!("handled in binary()"),
    };
    value.map(Number::Int).ok_or(SandboxError::Overflow)
}

fn float_op(op: BinaryOp, l: f64, r: f64) -> Result<Number, SandboxError> {
    let value = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::FloorDiv | BinaryOp::Mod if r == 0.0 => {
            return Err(SandboxError::DivisionByZero)
        }
        BinaryOp::FloorDiv => (l / r).floor(),
        BinaryOp::Mod => {
            let m = l % r;
            if m != 0.0 && ((m < 0.0) != (r < 0.0)) {
                m + r
            } else {
                m
            }
        }
        BinaryOp::Div | BinaryOp::Pow => unreachable!("handled in binary()"),
    };
    Ok(Number::Float(value))
}

fn int_pow(base: i64, exp: i64) -> Result<Number, SandboxError> {
    if exp < 0 {
        if base == 0 {
            return Err(SandboxError::DivisionByZero);
        }
        return Ok(Number::Float((base as f64).powf(exp as f64)));
    }
    let exp = u32::try_from(exp).map_err(|_| SandboxError::Overflow)?;
    base.checked_pow(exp)
        .map(Number::Int)
        .ok_or(SandboxError::Overflow)
}
