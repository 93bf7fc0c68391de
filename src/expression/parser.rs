//! Text parser for trigger expressions.
//!
//! Precedence, lowest first: `||`, `&&`, `==`/`!=`, `<`/`<=`/`>`/`>=`,
//! `+`/`-`, `*`/`/`/`%`, unary `!`/`-`, then primaries.

use std::iter::Peekable;
use std::str::CharIndices;

use regex::Regex;

use super::{Expression, Operator};
use crate::error::ExpressionError;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Op(&'static str),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Str(s) => format!("'{s}'"),
            Self::Ident(s) => s.clone(),
            Self::LParen => "(".to_string(),
            Self::RParen => ")".to_string(),
            Self::LBracket => "[".to_string(),
            Self::RBracket => "]".to_string(),
            Self::Comma => ",".to_string(),
            Self::Dot => ".".to_string(),
            Self::Op(op) => (*op).to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

struct Tokenizer<'a> {
    chars: Peekable<CharIndices<'a>>,
    input: &'a str,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || matches!(c, '_' | '$' | '@' | '#')
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '@' | '#')
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.char_indices().peekable(),
            input,
        }
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>, ExpressionError> {
        let mut tokens = Vec::new();
        while let Some(spanned) = self.next_token()? {
            tokens.push(spanned);
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, ExpressionError> {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        let Some((position, c)) = self.chars.next() else {
            return Ok(None);
        };
        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '.' if !self.peek_is_digit() => Token::Dot,
            '+' => Token::Op("+"),
            '-' => Token::Op("-"),
            '*' => Token::Op("*"),
            '/' => Token::Op("/"),
            '%' => Token::Op("%"),
            '&' => self.pair('&', "&&", position, c)?,
            '|' => self.pair('|', "||", position, c)?,
            '=' => self.pair('=', "==", position, c)?,
            '!' => self.optional_eq("!", "!="),
            '<' => self.optional_eq("<", "<="),
            '>' => self.optional_eq(">", ">="),
            '\'' | '"' => Token::Str(self.string(c, position)?),
            c if c.is_ascii_digit() || c == '.' => self.number(position)?,
            c if is_ident_start(c) => Token::Ident(self.ident(position)),
            c => return Err(ExpressionError::UnexpectedCharacter { ch: c, position }),
        };
        Ok(Some(Spanned { token, position }))
    }

    fn peek_is_digit(&mut self) -> bool {
        self.chars.peek().is_some_and(|(_, c)| c.is_ascii_digit())
    }

    fn pair(
        &mut self,
        second: char,
        op: &'static str,
        position: usize,
        first: char,
    ) -> Result<Token, ExpressionError> {
        if self.chars.next_if(|(_, c)| *c == second).is_some() {
            Ok(Token::Op(op))
        } else {
            Err(ExpressionError::UnexpectedCharacter { ch: first, position })
        }
    }

    fn optional_eq(&mut self, single: &'static str, double: &'static str) -> Token {
        if self.chars.next_if(|(_, c)| *c == '=').is_some() {
            Token::Op(double)
        } else {
            Token::Op(single)
        }
    }

    fn string(&mut self, quote: char, start: usize) -> Result<String, ExpressionError> {
        let mut out = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                c if c == quote => return Ok(out),
                c => out.push(c),
            }
        }
        Err(ExpressionError::UnterminatedString { position: start })
    }

    fn number(&mut self, start: usize) -> Result<Token, ExpressionError> {
        let mut end = start + 1;
        let mut is_float = &self.input[start..end] == ".";
        while let Some(&(i, c)) = self.chars.peek() {
            let exponent_sign = matches!(c, '+' | '-')
                && matches!(self.input[..i].chars().last(), Some('e' | 'E'));
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                is_float |= !c.is_ascii_digit();
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.input[start..end];
        let invalid = || ExpressionError::InvalidNumber {
            text: text.to_string(),
            position: start,
        };
        if is_float {
            text.parse::<f64>().map(Token::Float).map_err(|_| invalid())
        } else {
            text.parse::<i64>().map(Token::Int).map_err(|_| invalid())
        }
    }

    fn ident(&mut self, start: usize) -> String {
        let mut end = start + self.input[start..].chars().next().map_or(1, char::len_utf8);
        while let Some((i, c)) = self.chars.next_if(|(_, c)| is_ident_char(*c)) {
            end = i + c.len_utf8();
        }
        self.input[start..end].to_string()
    }
}

/// Nesting allowed for parentheses, calls and prefix operators.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

/// Parses a complete expression; trailing input is an error.
pub(super) fn parse(text: &str) -> Result<Expression, ExpressionError> {
    let tokens = Tokenizer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expression = parser.or()?;
    match parser.peek() {
        None => Ok(expression),
        Some(Spanned { token: Token::RParen, position }) => {
            Err(ExpressionError::UnbalancedParenthesis { position: *position })
        }
        Some(spanned) => Err(unexpected(spanned)),
    }
}

fn unexpected(spanned: &Spanned) -> ExpressionError {
    ExpressionError::UnexpectedToken {
        token: spanned.token.describe(),
        position: spanned.position,
    }
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    fn next_or_end(&mut self) -> Result<Spanned, ExpressionError> {
        self.advance().ok_or(ExpressionError::UnexpectedEnd)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek().is_some_and(|s| s.token == *token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested(
        &mut self,
        position: usize,
        parse: fn(&mut Self) -> Result<Expression, ExpressionError>,
    ) -> Result<Expression, ExpressionError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExpressionError::NestingTooDeep {
                max: MAX_DEPTH,
                position,
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Spanned { token: Token::Op(op), .. }) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn or(&mut self) -> Result<Expression, ExpressionError> {
        self.nary(Operator::Or, "||", Self::and)
    }

    fn and(&mut self) -> Result<Expression, ExpressionError> {
        self.nary(Operator::And, "&&", Self::equality)
    }

    /// Left-flattened chain such as `a && b && c`.
    fn nary(
        &mut self,
        op: Operator,
        symbol: &'static str,
        next: fn(&mut Self) -> Result<Expression, ExpressionError>,
    ) -> Result<Expression, ExpressionError> {
        let first = next(self)?;
        if self.eat_op(&[symbol]).is_none() {
            return Ok(first);
        }
        let mut args = vec![first, next(self)?];
        while self.eat_op(&[symbol]).is_some() {
            args.push(next(self)?);
        }
        Ok(Expression::call(op, args))
    }

    fn binary(
        &mut self,
        table: &[(&'static str, Operator)],
        next: fn(&mut Self) -> Result<Expression, ExpressionError>,
    ) -> Result<Expression, ExpressionError> {
        let symbols: Vec<&'static str> = table.iter().map(|(s, _)| *s).collect();
        let mut left = next(self)?;
        while let Some(symbol) = self.eat_op(&symbols) {
            let op = table
                .iter()
                .find(|(s, _)| *s == symbol)
                .map(|(_, op)| *op)
                .ok_or(ExpressionError::UnexpectedEnd)?;
            let right = next(self)?;
            left = Expression::call(op, vec![left, right]);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expression, ExpressionError> {
        self.binary(
            &[("==", Operator::Equal), ("!=", Operator::NotEqual)],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expression, ExpressionError> {
        self.binary(
            &[
                ("<", Operator::LessThan),
                ("<=", Operator::LessThanOrEqual),
                (">", Operator::GreaterThan),
                (">=", Operator::GreaterThanOrEqual),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expression, ExpressionError> {
        self.binary(
            &[("+", Operator::Add), ("-", Operator::Subtract)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expression, ExpressionError> {
        self.binary(
            &[
                ("*", Operator::Multiply),
                ("/", Operator::Divide),
                ("%", Operator::Modulo),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expression, ExpressionError> {
        let position = self.peek().map_or(0, |s| s.position);
        match self.eat_op(&["!", "-"]) {
            Some("!") => Ok(Expression::not(self.nested(position, Self::unary)?)),
            Some(_) => Ok(match self.nested(position, Self::unary)? {
                Expression::Constant(Value::Int(v)) => Expression::Constant(Value::Int(-v)),
                Expression::Constant(Value::Float(v)) => Expression::Constant(Value::Float(-v)),
                other => Expression::call(Operator::Negate, vec![other]),
            }),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expression, ExpressionError> {
        let Spanned { token, position } = self.next_or_end()?;
        match token {
            Token::Int(v) => Ok(Expression::Constant(Value::Int(v))),
            Token::Float(v) => Ok(Expression::Constant(Value::Float(v))),
            Token::Str(s) => Ok(Expression::Constant(Value::String(s))),
            Token::LParen => {
                let inner = self.nested(position, Self::or)?;
                if self.eat(&Token::RParen) {
                    Ok(inner)
                } else {
                    match self.peek() {
                        None => Err(ExpressionError::UnbalancedParenthesis { position }),
                        Some(spanned) => Err(unexpected(spanned)),
                    }
                }
            }
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    return self.function(name, position);
                }
                match name.as_str() {
                    "true" => Ok(Expression::Constant(Value::Bool(true))),
                    "false" => Ok(Expression::Constant(Value::Bool(false))),
                    "null" => Ok(Expression::Constant(Value::Null)),
                    _ => self.path(name),
                }
            }
            Token::RParen => Err(ExpressionError::UnbalancedParenthesis { position }),
            token => Err(unexpected(&Spanned { token, position })),
        }
    }

    /// Continues an accessor path with `.member` and `[index]` segments.
    fn path(&mut self, mut path: String) -> Result<Expression, ExpressionError> {
        loop {
            if self.eat(&Token::Dot) {
                match self.next_or_end()? {
                    Spanned { token: Token::Ident(member), .. } => {
                        path.push('.');
                        path.push_str(&member);
                    }
                    spanned => return Err(unexpected(&spanned)),
                }
            } else if self.eat(&Token::LBracket) {
                match self.next_or_end()? {
                    Spanned { token: Token::Int(index), .. } if index >= 0 => {
                        path.push_str(&format!("[{index}]"));
                    }
                    Spanned { token: Token::Str(key), .. } => {
                        path.push('.');
                        path.push_str(&key);
                    }
                    spanned => return Err(unexpected(&spanned)),
                }
                let close = self.next_or_end()?;
                if close.token != Token::RBracket {
                    return Err(unexpected(&close));
                }
            } else {
                return Ok(Expression::Accessor(path));
            }
        }
    }

    fn function(&mut self, name: String, position: usize) -> Result<Expression, ExpressionError> {
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.nested(position, Self::or)?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                if self.eat(&Token::RParen) {
                    break;
                }
                return match self.peek() {
                    None => Err(ExpressionError::UnbalancedParenthesis { position }),
                    Some(spanned) => Err(unexpected(spanned)),
                };
            }
        }

        let op = Operator::from_function(&name)
            .ok_or_else(|| ExpressionError::UnknownFunction { name: name.clone() })?;
        let expected = match op {
            Operator::And | Operator::Or => None,
            Operator::IsMatch | Operator::Contains => Some(2),
            _ => Some(1),
        };
        if let Some(expected) = expected {
            if args.len() != expected {
                return Err(ExpressionError::InvalidArity {
                    name,
                    expected: expected.to_string(),
                    actual: args.len(),
                });
            }
        }
        if op == Operator::IsMatch {
            match &args[1] {
                Expression::Constant(Value::String(pattern)) => {
                    Regex::new(pattern).map_err(|e| ExpressionError::InvalidRegex {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })?;
                }
                _ => return Err(ExpressionError::NonLiteralPattern),
            }
        }
        Ok(Expression::call(op, args))
    }
}
