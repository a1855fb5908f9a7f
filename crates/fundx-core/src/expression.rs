//! Arithmetic formula parsing and evaluation over named variables.
//!
//! Formulas are small infix expressions such as
//! `total_assets - current_assets` or `net_income / abs(interest_expenses)`.
//! The [`ExpressionEvaluator`] memoizes parsed forms by source text: the same
//! formula is evaluated once per symbol per date, so each distinct text is
//! parsed exactly once for the evaluator's lifetime.
//!
//! ## Grammar
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('^' unary)?
//! primary := NUMBER | IDENT | IDENT '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! Supported functions: `abs`, `min`, `max`, `sqrt`, `round`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

/// Expression evaluation failures. Callers decide whether they are fatal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("malformed expression '{expression}' at offset {offset}: {message}")]
    Parse {
        expression: String,
        offset: usize,
        message: String,
    },
    #[error("unknown variable '{name}'")]
    UnknownVariable { name: String },
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },
    #[error("function '{function}' expects {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
}

/// Named values an expression can read.
pub trait Variables {
    fn value_of(&self, name: &str) -> Option<f64>;
}

impl Variables for BTreeMap<String, f64> {
    fn value_of(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl Variables for HashMap<String, f64> {
    fn value_of(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Min,
    Max,
    Sqrt,
    Round,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Self::Abs),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "sqrt" => Some(Self::Sqrt),
            "round" => Some(Self::Round),
            _ => None,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sqrt => "sqrt",
            Self::Round => "round",
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Negate(Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// Parse a formula without caching.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let mut parser = Parser::new(source)?;
        let expr = parser.expr()?;
        match parser.tokens.get(parser.pos) {
            None => Ok(expr),
            Some((offset, token)) => Err(parser.error_at(*offset, format!("unexpected {token:?}"))),
        }
    }

    /// Names of all variables referenced, excluding function names.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut BTreeSet<String>) {
        match self {
            Self::Number(_) => {}
            Self::Variable(name) => {
                names.insert(name.clone());
            }
            Self::Negate(inner) => inner.collect_variables(names),
            Self::Binary(lhs, _, rhs) => {
                lhs.collect_variables(names);
                rhs.collect_variables(names);
            }
            Self::Call(_, args) => {
                for arg in args {
                    arg.collect_variables(names);
                }
            }
        }
    }

    pub fn evaluate(&self, variables: &impl Variables) -> Result<f64, ExpressionError> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Variable(name) => variables
                .value_of(name)
                .ok_or_else(|| ExpressionError::UnknownVariable { name: name.clone() }),
            Self::Negate(inner) => Ok(-inner.evaluate(variables)?),
            Self::Binary(lhs, op, rhs) => {
                let lhs = lhs.evaluate(variables)?;
                let rhs = rhs.evaluate(variables)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div if rhs == 0.0 => Err(ExpressionError::DivisionByZero),
                    BinaryOp::Div => Ok(lhs / rhs),
                    BinaryOp::Pow => Ok(lhs.powf(rhs)),
                }
            }
            Self::Call(function, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(variables))
                    .collect::<Result<Vec<_>, _>>()?;
                apply(*function, &values)
            }
        }
    }
}

fn apply(function: Function, values: &[f64]) -> Result<f64, ExpressionError> {
    let unary = |f: fn(f64) -> f64| match values {
        [value] => Ok(f(*value)),
        _ => Err(ExpressionError::Arity {
            function: function.name(),
            expected: "1",
            found: values.len(),
        }),
    };

    match function {
        Function::Abs => unary(f64::abs),
        Function::Sqrt => unary(f64::sqrt),
        Function::Round => unary(f64::round),
        Function::Min | Function::Max => {
            if values.is_empty() {
                return Err(ExpressionError::Arity {
                    function: function.name(),
                    expected: "at least 1",
                    found: 0,
                });
            }
            let fold: fn(f64, f64) -> f64 = if function == Function::Min {
                f64::min
            } else {
                f64::max
            };
            Ok(values[1..].iter().copied().fold(values[0], fold))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

/// Deepest nesting of parentheses, calls, signs and exponents accepted.
const MAX_NESTING: usize = 64;

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, ExpressionError> {
        let mut parser = Self {
            source,
            tokens: Vec::new(),
            pos: 0,
            depth: 0,
        };
        parser.tokens = parser.tokenize()?;
        Ok(parser)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Parse {
            expression: self.source.to_owned(),
            offset,
            message: message.into(),
        }
    }

    fn tokenize(&self) -> Result<Vec<(usize, Token)>, ExpressionError> {
        let mut tokens = Vec::new();
        let mut chars = self.source.char_indices().peekable();

        while let Some(&(offset, ch)) = chars.peek() {
            let token = match ch {
                c if c.is_whitespace() => {
                    chars.next();
                    continue;
                }
                '0'..='9' | '.' => self.number(&mut chars)?,
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(&(_, c)) = chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                            ident.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    Token::Ident(ident)
                }
                _ => {
                    chars.next();
                    match ch {
                        '+' => Token::Plus,
                        '-' => Token::Minus,
                        '*' => Token::Star,
                        '/' => Token::Slash,
                        '^' => Token::Caret,
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        ',' => Token::Comma,
                        other => {
                            return Err(self.error_at(offset, format!("unexpected character '{other}'")))
                        }
                    }
                }
            };
            tokens.push((offset, token));
        }

        Ok(tokens)
    }

    fn number(&self, chars: &mut Peekable<CharIndices<'_>>) -> Result<Token, ExpressionError> {
        let start = chars.peek().map(|(offset, _)| *offset).unwrap_or_default();
        let mut end = start;
        let mut previous = ' ';

        while let Some(&(offset, c)) = chars.peek() {
            let exponent_sign = (c == '+' || c == '-') && (previous == 'e' || previous == 'E');
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                previous = c;
                end = offset + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }

        let text = &self.source[start..end];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error_at(start, format!("invalid number '{text}'")))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.source.len())
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, token)| token.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        let offset = self.offset();
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(self.error_at(offset, format!("expected {expected:?}, found {token:?}"))),
            None => Err(self.error_at(offset, format!("expected {expected:?}, found end of input"))),
        }
    }

    fn expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
    }

    /// Every recursive production passes through here, so the depth guard
    /// bounds the parser's stack use.
    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_at(
                self.offset(),
                format!("nesting deeper than {MAX_NESTING} levels"),
            ));
        }
        self.depth += 1;
        let result = self.signed();
        self.depth -= 1;
        result
    }

    fn signed(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Negate(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Variable(name));
                }
                let function = Function::from_name(&name)
                    .ok_or(ExpressionError::UnknownFunction { name })?;
                self.pos += 1;
                let mut args = vec![self.expr()?];
                while self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                    args.push(self.expr()?);
                }
                self.expect(Token::RParen)?;
                Ok(Expr::Call(function, args))
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(token) => Err(self.error_at(offset, format!("unexpected {token:?}"))),
            None => Err(self.error_at(offset, "unexpected end of input")),
        }
    }
}

/// Formula evaluator with a parse memo keyed by source text.
#[derive(Debug, Default)]
pub struct ExpressionEvaluator {
    cache: Mutex<HashMap<String, Arc<Expr>>>,
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `source`, reusing an earlier parse of the same text.
    pub fn parse(&self, source: &str) -> Result<Arc<Expr>, ExpressionError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(expr) = cache.get(source) {
            return Ok(Arc::clone(expr));
        }

        let expr = Arc::new(Expr::parse(source)?);
        cache.insert(source.to_owned(), Arc::clone(&expr));
        Ok(expr)
    }

    pub fn evaluate(
        &self,
        source: &str,
        variables: &impl Variables,
    ) -> Result<f64, ExpressionError> {
        self.parse(source)?.evaluate(variables)
    }

    pub fn variables(&self, source: &str) -> Result<BTreeSet<String>, ExpressionError> {
        Ok(self.parse(source)?.variables())
    }

    /// Number of distinct formula texts parsed so far.
    pub fn cached_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
