use serde_json::Value;

use super::lexer::{tokenize, Spanned, Token};
use super::ExprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// String literal, interpolated at evaluation time.
    Text(String),
    /// Placeholder body, resolved against the context.
    Path(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// Deepest a parsed statement may get. Parentheses, unary operators and
/// each chained binary operator add a level.
pub const MAX_NESTING: usize = 64;

/// Parse a statement. An empty statement parses to `null`.
///
/// Precedence, loosest first: `||`, `&&`, `== !=`, `< <= > >= contains`,
/// `+ -`, `* / %`, unary `! -`. Nesting deeper than [`MAX_NESTING`] is an
/// error.
pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Ok(Expr::Literal(Value::Null));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
        depth: 0,
    };
    let expr = parser.or()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(ExprError::new(
            extra.pos,
            format!("unexpected '{}' after end of expression", extra.token),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |s| s.pos)
    }

    /// Consume the next token if `pick` maps it to an operator.
    fn operator<T>(&mut self, pick: impl Fn(&Token) -> Option<T>) -> Option<T> {
        let op = self.peek().and_then(pick)?;
        self.pos += 1;
        Some(op)
    }

    /// Enter one nesting level; undone by `self.depth -= 1` on success.
    fn nest(&mut self, pos: usize) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ExprError::new(pos, "expression nested too deeply"));
        }
        Ok(())
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ExprError>,
        pick: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr, ExprError> {
        let mut left = next(self)?;
        let mut chained = 0;
        loop {
            let pos = self.offset();
            let Some(op) = self.operator(pick) else {
                break;
            };
            self.nest(pos)?;
            chained += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth -= chained;
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(Self::and, |t| (*t == Token::Or).then_some(BinaryOp::Or))
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(Self::equality, |t| (*t == Token::And).then_some(BinaryOp::And))
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(Self::comparison, |t| match t {
            Token::EqEq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::NotEq),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(Self::additive, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            Token::Contains => Some(BinaryOp::Contains),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(Self::multiplicative, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(Self::unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        let pos = self.offset();
        let op = self.operator(|t| match t {
            Token::Bang => Some(UnaryOp::Not),
            Token::Minus => Some(UnaryOp::Neg),
            _ => None,
        });
        let Some(op) = op else {
            return self.primary();
        };
        self.nest(pos)?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let pos = self.offset();
        let Some(token) = self.peek().cloned() else {
            return Err(ExprError::new(pos, "unexpected end of expression"));
        };
        self.pos += 1;
        match token {
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Float(n) => Ok(Expr::Literal(
                serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number),
            )),
            Token::Str(s) => Ok(Expr::Text(s)),
            Token::Placeholder(p) => Ok(Expr::Path(p)),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::LParen => {
                self.nest(pos)?;
                let inner = self.or()?;
                self.depth -= 1;
                if self.peek() != Some(&Token::RParen) {
                    return Err(ExprError::new(self.offset(), "expected ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            other => Err(ExprError::new(pos, format!("unexpected '{}'", other))),
        }
    }
}
