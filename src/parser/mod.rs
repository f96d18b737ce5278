//! Text parser for reducers and input values
//!
//! Reducers use closure syntax with Rust operator precedence:
//!
//! ```text
//! |s: (bool, int), i: int| if s.0 { (true, s.1 + i) } else { (i > 0, s.1) }
//! ```
//!
//! Values are integers, `true`/`false` and parenthesized tuples.

use std::fmt;

use crate::frontend::{BinaryOp, Expr, Param, Reducer, TypeExpr, UnaryOp};
use crate::semantics::concrete::Value;

/// Parse error with location information
#[derive(Debug, Clone)]
pub struct ParseError {
    pub line_number: usize,
    pub column: Option<usize>,
    pub message: String,
    pub line_content: String,
}

impl ParseError {
    pub fn new(
        line_number: usize,
        message: impl Into<String>,
        line_content: impl Into<String>,
    ) -> Self {
        Self {
            line_number,
            column: None,
            message: message.into(),
            line_content: line_content.into(),
        }
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = self.column {
            write!(
                f,
                "line {}, column {}: {}\n  | {}\n  | {}^",
                self.line_number,
                col,
                self.message,
                self.line_content,
                " ".repeat(col.saturating_sub(1))
            )
        } else {
            write!(
                f,
                "line {}: {}\n  | {}",
                self.line_number, self.message, self.line_content
            )
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    /// Magnitude only; a leading `-` is folded in by the parser
    Int(u64),
    Ident(String),
    Str(String),
    Sym(&'static str),
    Eof,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Int(v) => write!(f, "`{}`", v),
            Tok::Ident(name) => write!(f, "`{}`", name),
            Tok::Str(s) => write!(f, "string {:?}", s),
            Tok::Sym(sym) => write!(f, "`{}`", sym),
            Tok::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
    column: usize,
}

// Longest first so `||` wins over `|`
const SYMBOLS: &[&str] = &[
    "||", "&&", "==", "!=", "<=", ">=", "|", ":", ",", "(", ")", "{", "}", "[", "]", ".", "!",
    "-", "+", "*", "/", "%", "^", "<", ">",
];

fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut last = (1, 1);
    for (index, line) in source.lines().enumerate() {
        let line_number = index + 1;
        let chars: Vec<char> = line.chars().collect();
        let error = |column: usize, message: String| {
            ParseError::new(line_number, message, line).with_column(column)
        };
        let mut pos = 0;
        while pos < chars.len() {
            let c = chars[pos];
            let column = pos + 1;
            if c.is_whitespace() {
                pos += 1;
                continue;
            }
            if c == '/' && chars.get(pos + 1) == Some(&'/') {
                break;
            }
            let tok = if c.is_ascii_digit() {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '_') {
                    pos += 1;
                }
                let text: String = chars[start..pos].iter().filter(|c| **c != '_').collect();
                let value = text
                    .parse::<u64>()
                    .map_err(|e| error(column, format!("invalid integer '{}': {}", text, e)))?;
                Tok::Int(value)
            } else if c.is_alphabetic() || c == '_' {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                Tok::Ident(chars[start..pos].iter().collect())
            } else if c == '"' {
                let start = pos + 1;
                pos += 1;
                while pos < chars.len() && chars[pos] != '"' {
                    pos += 1;
                }
                if pos == chars.len() {
                    return Err(error(column, "unterminated string literal".to_string()));
                }
                pos += 1;
                Tok::Str(chars[start..pos - 1].iter().collect())
            } else {
                let rest: String = chars[pos..].iter().take(2).collect();
                let Some(sym) = SYMBOLS.iter().find(|sym| rest.starts_with(**sym)) else {
                    return Err(error(column, format!("unexpected character '{}'", c)));
                };
                pos += sym.chars().count();
                Tok::Sym(*sym)
            };
            tokens.push(Token {
                tok,
                line: line_number,
                column,
            });
        }
        last = (line_number, chars.len() + 1);
    }
    tokens.push(Token {
        tok: Tok::Eof,
        line: last.0,
        column: last.1,
    });
    Ok(tokens)
}

struct Parser<'a> {
    lines: Vec<&'a str>,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self, ParseError> {
        Ok(Self {
            lines: source.lines().collect(),
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn advance(&mut self) -> Tok {
        let tok = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let token = &self.tokens[self.pos];
        let content = self.lines.get(token.line - 1).copied().unwrap_or("");
        ParseError::new(token.line, message, content).with_column(token.column)
    }

    fn at_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Tok::Sym(s) if *s == sym)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Tok::Ident(name) if name == keyword)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if self.at_sym(sym) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), ParseError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`, found {}", sym, self.peek())))
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if *self.peek() == Tok::Eof {
            Ok(())
        } else {
            Err(self.error(format!("unexpected {} after the end", self.peek())))
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Tok::Ident(name) if !is_keyword(&name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found {}", other))),
        }
    }

    fn reducer(&mut self) -> Result<Reducer, ParseError> {
        self.expect_sym("|")?;
        let state = self.param()?;
        self.expect_sym(",")?;
        let input = self.param()?;
        self.eat_sym(",");
        self.expect_sym("|")?;
        let body = self.expr()?;
        self.expect_eof()?;
        Ok(Reducer { state, input, body })
    }

    fn param(&mut self) -> Result<Param, ParseError> {
        let name = self.ident()?;
        if !self.eat_sym(":") {
            return Err(self.error(format!("parameter `{}` needs a type", name)));
        }
        let ty = self.ty()?;
        Ok(Param::new(name, ty))
    }

    fn ty(&mut self) -> Result<TypeExpr, ParseError> {
        if self.eat_sym("(") {
            let mut fields = Vec::new();
            while !self.at_sym(")") {
                fields.push(self.ty()?);
                if !self.eat_sym(",") {
                    break;
                }
            }
            self.expect_sym(")")?;
            return Ok(TypeExpr::Tuple(fields));
        }
        let name = self.ident()?;
        Ok(match name.as_str() {
            "int" | "i64" => TypeExpr::Int,
            "bool" => TypeExpr::Bool,
            _ => TypeExpr::Named(name),
        })
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(0)
    }

    /// Left-associative binary operators, loosest level first
    fn binary_level(&mut self, level: usize) -> Result<Expr, ParseError> {
        const LEVELS: &[&[(&str, BinaryOp)]] = &[
            &[("||", BinaryOp::Or)],
            &[("&&", BinaryOp::And)],
            &[
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            &[("^", BinaryOp::Xor)],
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Mod)],
        ];
        const COMPARISON: usize = 2;

        let Some(ops) = LEVELS.get(level) else {
            return self.unary();
        };
        let mut lhs = self.binary_level(level + 1)?;
        loop {
            let Some(&(_, op)) = ops.iter().find(|(sym, _)| self.at_sym(sym)) else {
                return Ok(lhs);
            };
            self.advance();
            let rhs = self.binary_level(level + 1)?;
            lhs = Expr::binary(op, lhs, rhs);
            if level == COMPARISON && ops.iter().any(|(sym, _)| self.at_sym(sym)) {
                return Err(self.error("comparison operators cannot be chained"));
            }
        }
    }

    /// Check a literal's magnitude against the `i64` range
    fn int_literal(&self, magnitude: u64, negative: bool) -> Result<i64, ParseError> {
        let value = if negative {
            -i128::from(magnitude)
        } else {
            i128::from(magnitude)
        };
        i64::try_from(value).map_err(|_| self.error(format!("integer literal {} is out of range", value)))
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = if self.eat_sym("!") {
            UnaryOp::Not
        } else if self.eat_sym("-") {
            // `-<literal>` is a literal unless a field access follows
            if let Tok::Int(magnitude) = *self.peek() {
                let field_follows = matches!(
                    self.tokens.get(self.pos + 1).map(|t| &t.tok),
                    Some(Tok::Sym("."))
                );
                if !field_follows {
                    let value = self.int_literal(magnitude, true)?;
                    self.advance();
                    return Ok(Expr::Int(value));
                }
            }
            UnaryOp::Neg
        } else if self.eat_sym("+") {
            UnaryOp::Plus
        } else {
            return self.postfix();
        };
        Ok(Expr::unary(op, self.unary()?))
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_sym(".") {
                match self.advance() {
                    Tok::Int(index) => {
                        let index = usize::try_from(index)
                            .map_err(|_| self.error(format!("field index {} is too large", index)))?;
                        expr = Expr::field(expr, index);
                    }
                    Tok::Ident(name) => {
                        if !self.at_sym("(") {
                            return Err(self.error(format!("named field `{}` is not supported", name)));
                        }
                        let mut args = vec![expr];
                        args.extend(self.call_args()?);
                        expr = Expr::Call { name, args };
                    }
                    other => return Err(self.error(format!("expected field index, found {}", other))),
                }
            } else if self.at_sym("(") {
                let Expr::Ident(name) = expr else {
                    return Err(self.error("only named functions can be called"));
                };
                let args = self.call_args()?;
                expr = Expr::Call { name, args };
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect_sym("(")?;
        let mut args = Vec::new();
        while !self.at_sym(")") {
            args.push(self.expr()?);
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_sym(")")?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        if self.at_keyword("if") {
            return self.if_expr();
        }
        if self.at_sym("{") {
            return self.block();
        }
        match self.peek().clone() {
            Tok::Int(magnitude) => {
                let value = self.int_literal(magnitude, false)?;
                self.advance();
                Ok(Expr::Int(value))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Tok::Ident(name) if name == "true" || name == "false" => {
                self.advance();
                Ok(Expr::Bool(name == "true"))
            }
            Tok::Ident(_) => Ok(Expr::Ident(self.ident()?)),
            Tok::Sym("(") => {
                self.advance();
                let mut items = Vec::new();
                let mut trailing_comma = false;
                while !self.at_sym(")") {
                    items.push(self.expr()?);
                    trailing_comma = self.eat_sym(",");
                    if !trailing_comma {
                        break;
                    }
                }
                self.expect_sym(")")?;
                match items.len() {
                    0 => Err(self.error("unit values are not supported")),
                    1 if !trailing_comma => Ok(items.remove(0)),
                    _ => Ok(Expr::Tuple(items)),
                }
            }
            other => Err(self.error(format!("expected expression, found {}", other))),
        }
    }

    fn block(&mut self) -> Result<Expr, ParseError> {
        self.expect_sym("{")?;
        let inner = self.expr()?;
        self.expect_sym("}")?;
        Ok(inner)
    }

    fn if_expr(&mut self) -> Result<Expr, ParseError> {
        self.advance();
        let cond = self.expr()?;
        let then = self.block()?;
        if !self.at_keyword("else") {
            return Err(self.error("`if` without `else` has no value"));
        }
        self.advance();
        let els = if self.at_keyword("if") {
            self.if_expr()?
        } else {
            self.block()?
        };
        Ok(Expr::if_else(cond, then, els))
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        match self.advance() {
            Tok::Int(magnitude) => Ok(Value::Int(self.int_literal(magnitude, false)?)),
            Tok::Sym("-") => match self.advance() {
                Tok::Int(magnitude) => Ok(Value::Int(self.int_literal(magnitude, true)?)),
                other => Err(self.error(format!("expected integer after `-`, found {}", other))),
            },
            Tok::Ident(name) if name == "true" => Ok(Value::Bool(true)),
            Tok::Ident(name) if name == "false" => Ok(Value::Bool(false)),
            Tok::Sym("(") => {
                let mut items = Vec::new();
                while !self.at_sym(")") {
                    items.push(self.value()?);
                    if !self.eat_sym(",") {
                        break;
                    }
                }
                self.expect_sym(")")?;
                if items.is_empty() {
                    return Err(self.error("unit values are not supported"));
                }
                Ok(Value::Tuple(items))
            }
            other => Err(self.error(format!("expected value, found {}", other))),
        }
    }
}

fn is_keyword(name: &str) -> bool {
    matches!(name, "if" | "else" | "true" | "false")
}

/// Parse a reducer in closure syntax
pub fn parse_reducer(source: &str) -> Result<Reducer, ParseError> {
    Parser::new(source)?.reducer()
}

/// Parse a single value such as `(true, -3)`
pub fn parse_value(source: &str) -> Result<Value, ParseError> {
    let mut parser = Parser::new(source)?;
    let value = parser.value()?;
    parser.expect_eof()?;
    Ok(value)
}

/// Parse a comma-separated list of values, optionally in brackets
pub fn parse_values(source: &str) -> Result<Vec<Value>, ParseError> {
    let mut parser = Parser::new(source)?;
    let bracketed = parser.eat_sym("[");
    let mut values = Vec::new();
    while *parser.peek() != Tok::Eof && !parser.at_sym("]") {
        values.push(parser.value()?);
        if !parser.eat_sym(",") {
            break;
        }
    }
    if bracketed {
        parser.expect_sym("]")?;
    }
    parser.expect_eof()?;
    Ok(values)
}
