//! Recursive-descent parser producing [`Expr`] trees.
//!
//! Precedence, lowest first: `||`, `&&`, `==` `!=`, `<` `<=` `>` `>=`,
//! unary `!`, then postfix property/index access and calls.

use super::ExprError;
use super::lexer::{Token, TokenKind, tokenize};
use super::value::Value;
use miette::SourceSpan;

/// Named contexts that may appear at the root of an expression.
pub const CONTEXTS: &[&str] = &[
    "github", "env", "matrix", "steps", "runner", "job", "strategy", "inputs", "vars", "secrets",
];

/// Built-in functions and their accepted argument counts.
const FUNCTIONS: &[(&str, usize, Option<usize>)] = &[
    ("success", 0, Some(0)),
    ("always", 0, Some(0)),
    ("failure", 0, Some(0)),
    ("cancelled", 0, Some(0)),
    ("contains", 2, Some(2)),
    ("startsWith", 2, Some(2)),
    ("endsWith", 2, Some(2)),
    ("format", 1, None),
    ("join", 1, Some(2)),
    ("toJSON", 1, Some(1)),
    ("fromJSON", 1, Some(1)),
    ("hashFiles", 1, None),
];

/// Functions that inspect job status.
pub(crate) const STATUS_FUNCTIONS: &[&str] = &["success", "always", "failure", "cancelled"];

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Expression syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    Literal(Value),
    /// Root context name (`github`, `matrix`, ...)
    Context(String),
    /// `base.name`
    Property(Box<Expr>, String),
    /// `base[index]`
    Index(Box<Expr>, Box<Expr>),
    /// Function call; the name is canonicalized to its declared casing
    Call(String, Vec<Expr>),
    /// `!operand`
    Not(Box<Expr>),
    /// Binary operation
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Whether the expression calls any status function.
    #[must_use]
    pub fn uses_status_function(&self) -> bool {
        match self {
            Self::Literal(_) | Self::Context(_) => false,
            Self::Property(base, _) => base.uses_status_function(),
            Self::Index(base, index) => base.uses_status_function() || index.uses_status_function(),
            Self::Call(name, args) => {
                STATUS_FUNCTIONS.contains(&name.as_str())
                    || args.iter().any(Self::uses_status_function)
            }
            Self::Not(inner) => inner.uses_status_function(),
            Self::Binary(_, lhs, rhs) => lhs.uses_status_function() || rhs.uses_status_function(),
        }
    }
}

/// Parse the expression in `source[start..end]`.
pub(crate) fn parse(source: &str, start: usize, end: usize) -> Result<Expr, ExprError> {
    let tokens = tokenize(source, start, end)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    if parser.peek().kind == TokenKind::Eof {
        return Err(ExprError::syntax(
            source,
            (start, end.saturating_sub(start)).into(),
            "empty expression".to_string(),
        ));
    }
    let expr = parser.parse_or()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(ExprError::syntax(
            source,
            trailing.span(),
            "unexpected token after expression".to_string(),
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ExprError> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("expected {what}")))
        }
    }

    fn error_here(&self, message: String) -> ExprError {
        ExprError::syntax(self.source, self.peek().span(), message)
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&TokenKind::Not) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let token = self.advance();
                let name = match token.kind {
                    TokenKind::Ident(name) => name,
                    TokenKind::True => "true".to_string(),
                    TokenKind::False => "false".to_string(),
                    TokenKind::Null => "null".to_string(),
                    _ => {
                        return Err(ExprError::syntax(
                            self.source,
                            token.span(),
                            "expected property name after `.`".to_string(),
                        ));
                    }
                };
                expr = Expr::Property(Box::new(expr), name);
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_or()?;
                self.expect(&TokenKind::RBracket, "`]`")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::Ident(ref name) => {
                if self.peek().kind == TokenKind::LParen {
                    self.parse_call(name, token.span())
                } else {
                    let lower = name.to_ascii_lowercase();
                    if CONTEXTS.contains(&lower.as_str()) {
                        Ok(Expr::Context(lower))
                    } else {
                        Err(ExprError::UnknownContext {
                            name: name.clone(),
                            src: ExprError::named_source(self.source),
                            span: token.span(),
                        })
                    }
                }
            }
            _ => Err(ExprError::syntax(
                self.source,
                token.span(),
                "expected a value".to_string(),
            )),
        }
    }

    fn parse_call(&mut self, name: &str, name_span: SourceSpan) -> Result<Expr, ExprError> {
        let Some(&(canonical, min, max)) = FUNCTIONS
            .iter()
            .find(|(f, _, _)| f.eq_ignore_ascii_case(name))
        else {
            return Err(ExprError::UnknownFunction {
                name: name.to_string(),
                src: ExprError::named_source(self.source),
                span: name_span,
            });
        };

        self.expect(&TokenKind::LParen, "`(`")?;
        let mut args = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(&TokenKind::RParen, "`,` or `)`")?;
                break;
            }
        }

        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            let expected = match max {
                Some(max) if max == min => format!("{min}"),
                Some(max) => format!("{min} to {max}"),
                None => format!("at least {min}"),
            };
            return Err(ExprError::Arity {
                name: canonical.to_string(),
                expected,
                found: args.len(),
                src: ExprError::named_source(self.source),
                span: name_span,
            });
        }

        Ok(Expr::Call(canonical.to_string(), args))
    }
}
