//! Recursive-descent parser from tokens to [`Expr`].
//!
//! Precedence, lowest first: conditional, `??`, `||`, `&&`, equality,
//! relational, additive, multiplicative, unary, postfix (member/index/call).

use serde_json::Value;

use super::token::{tokenize, Delimiter, Operator, Token, TokenSpan};

/// Deepest nesting of sub-expressions accepted by the parser.
pub const MAX_NESTING: usize = 64;

/// Tallest syntax tree accepted by the parser. Long operator or member chains
/// fold into left-deep trees, so this bounds them as well.
pub const MAX_HEIGHT: usize = 256;

type Parsed = Result<(Expr, usize), SyntaxError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Identifier(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
        optional: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub position: usize,
}

impl SyntaxError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// Parses a complete expression. Trailing tokens are an error.
pub fn parse(source: &str) -> Result<Expr, SyntaxError> {
    let tokens = tokenize(source).map_err(|e| SyntaxError::new(e.message, e.position))?;
    if tokens.is_empty() {
        return Err(SyntaxError::new("empty expression", 0));
    }

    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
        end: source.len(),
    };
    let (expr, _) = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(span) => Err(SyntaxError::new(
            format!("unexpected token `{}`", describe(&span.token)),
            span.start,
        )),
    }
}

struct Parser<'t> {
    tokens: &'t [TokenSpan],
    pos: usize,
    depth: usize,
    end: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t TokenSpan> {
        self.tokens.get(self.pos)
    }

    fn position(&self) -> usize {
        self.peek().map(|t| t.start).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<&'t TokenSpan> {
        let span = self.tokens.get(self.pos);
        if span.is_some() {
            self.pos += 1;
        }
        span
    }

    fn eat_operator(&mut self, op: Operator) -> bool {
        if matches!(self.peek(), Some(TokenSpan { token: Token::Operator(o), .. }) if *o == op) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_delimiter(&mut self, delimiter: Delimiter) -> bool {
        if matches!(self.peek(), Some(TokenSpan { token: Token::Delimiter(d), .. }) if *d == delimiter)
        {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_delimiter(&mut self, delimiter: Delimiter) -> Result<(), SyntaxError> {
        if self.eat_delimiter(delimiter) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected `{}`", delimiter)))
        }
    }

    fn unexpected(&self, expectation: &str) -> SyntaxError {
        match self.peek() {
            Some(span) => SyntaxError::new(
                format!("{}, found `{}`", expectation, describe(&span.token)),
                span.start,
            ),
            None => SyntaxError::new(format!("{}, found end of input", expectation), self.end),
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(SyntaxError::new(
                format!("expression nesting exceeds {} levels", MAX_NESTING),
                self.position(),
            ));
        }
        Ok(())
    }

    /// Height of a node whose tallest child is `child` levels high.
    fn grow(&self, child: usize) -> Result<usize, SyntaxError> {
        let height = child + 1;
        if height > MAX_HEIGHT {
            return Err(SyntaxError::new(
                format!("expression nesting exceeds {} levels", MAX_HEIGHT),
                self.position(),
            ));
        }
        Ok(height)
    }

    fn parse_expression(&mut self) -> Parsed {
        self.enter()?;
        let parsed = self.parse_conditional();
        self.depth -= 1;
        parsed
    }

    fn parse_conditional(&mut self) -> Parsed {
        let (test, test_height) = self.parse_nullish()?;
        if !self.eat_operator(Operator::Question) {
            return Ok((test, test_height));
        }
        let (consequent, consequent_height) = self.parse_expression()?;
        self.expect_delimiter(Delimiter::Colon)?;
        let (alternate, alternate_height) = self.parse_expression()?;
        let height = self.grow(test_height.max(consequent_height).max(alternate_height))?;
        let expr = Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        };
        Ok((expr, height))
    }

    fn parse_nullish(&mut self) -> Parsed {
        let (mut left, mut height) = self.parse_or()?;
        while self.eat_operator(Operator::Nullish) {
            let (right, right_height) = self.parse_or()?;
            height = self.grow(height.max(right_height))?;
            left = logical(LogicalOp::Nullish, left, right);
        }
        Ok((left, height))
    }

    fn parse_or(&mut self) -> Parsed {
        let (mut left, mut height) = self.parse_and()?;
        while self.eat_operator(Operator::Or) {
            let (right, right_height) = self.parse_and()?;
            height = self.grow(height.max(right_height))?;
            left = logical(LogicalOp::Or, left, right);
        }
        Ok((left, height))
    }

    fn parse_and(&mut self) -> Parsed {
        let (mut left, mut height) = self.parse_equality()?;
        while self.eat_operator(Operator::And) {
            let (right, right_height) = self.parse_equality()?;
            height = self.grow(height.max(right_height))?;
            left = logical(LogicalOp::And, left, right);
        }
        Ok((left, height))
    }

    fn parse_equality(&mut self) -> Parsed {
        let (mut left, mut height) = self.parse_relational()?;
        loop {
            let op = match self.peek_operator() {
                Some(Operator::EqualEqual) => BinaryOp::Equal,
                Some(Operator::NotEqual) => BinaryOp::NotEqual,
                Some(Operator::StrictEqual) => BinaryOp::StrictEqual,
                Some(Operator::StrictNotEqual) => BinaryOp::StrictNotEqual,
                _ => return Ok((left, height)),
            };
            self.pos += 1;
            let (right, right_height) = self.parse_relational()?;
            height = self.grow(height.max(right_height))?;
            left = binary(op, left, right);
        }
    }

    fn parse_relational(&mut self) -> Parsed {
        let (mut left, mut height) = self.parse_additive()?;
        loop {
            let op = match self.peek_operator() {
                Some(Operator::Less) => BinaryOp::Less,
                Some(Operator::LessEqual) => BinaryOp::LessEqual,
                Some(Operator::Greater) => BinaryOp::Greater,
                Some(Operator::GreaterEqual) => BinaryOp::GreaterEqual,
                _ => return Ok((left, height)),
            };
            self.pos += 1;
            let (right, right_height) = self.parse_additive()?;
            height = self.grow(height.max(right_height))?;
            left = binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> Parsed {
        let (mut left, mut height) = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_operator() {
                Some(Operator::Plus) => BinaryOp::Add,
                Some(Operator::Minus) => BinaryOp::Subtract,
                _ => return Ok((left, height)),
            };
            self.pos += 1;
            let (right, right_height) = self.parse_multiplicative()?;
            height = self.grow(height.max(right_height))?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Parsed {
        let (mut left, mut height) = self.parse_unary()?;
        loop {
            let op = match self.peek_operator() {
                Some(Operator::Multiply) => BinaryOp::Multiply,
                Some(Operator::Divide) => BinaryOp::Divide,
                Some(Operator::Modulo) => BinaryOp::Modulo,
                _ => return Ok((left, height)),
            };
            self.pos += 1;
            let (right, right_height) = self.parse_unary()?;
            height = self.grow(height.max(right_height))?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Parsed {
        let op = match self.peek_operator() {
            Some(Operator::Not) => UnaryOp::Not,
            Some(Operator::Minus) => UnaryOp::Negate,
            Some(Operator::Plus) => UnaryOp::Plus,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.parse_unary();
        self.depth -= 1;
        let (operand, operand_height) = operand?;
        let height = self.grow(operand_height)?;
        let expr = Expr::Unary {
            op,
            operand: Box::new(operand),
        };
        Ok((expr, height))
    }

    fn parse_postfix(&mut self) -> Parsed {
        let (mut expr, mut height) = self.parse_primary()?;
        loop {
            if self.eat_operator(Operator::Dot) {
                let property = self.expect_property_name()?;
                height = self.grow(height)?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                };
            } else if self.eat_operator(Operator::OptionalDot) {
                if self.eat_delimiter(Delimiter::OpenBracket) {
                    let (index, index_height) = self.parse_expression()?;
                    self.expect_delimiter(Delimiter::CloseBracket)?;
                    height = self.grow(height.max(index_height))?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: true,
                    };
                } else if self.eat_delimiter(Delimiter::OpenParen) {
                    let (arguments, arguments_height) = self.parse_list(Delimiter::CloseParen)?;
                    height = self.grow(height.max(arguments_height))?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        arguments,
                        optional: true,
                    };
                } else {
                    let property = self.expect_property_name()?;
                    height = self.grow(height)?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: true,
                    };
                }
            } else if self.eat_delimiter(Delimiter::OpenBracket) {
                let (index, index_height) = self.parse_expression()?;
                self.expect_delimiter(Delimiter::CloseBracket)?;
                height = self.grow(height.max(index_height))?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    optional: false,
                };
            } else if self.eat_delimiter(Delimiter::OpenParen) {
                let (arguments, arguments_height) = self.parse_list(Delimiter::CloseParen)?;
                height = self.grow(height.max(arguments_height))?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    arguments,
                    optional: false,
                };
            } else {
                return Ok((expr, height));
            }
        }
    }

    fn parse_primary(&mut self) -> Parsed {
        let Some(span) = self.advance() else {
            return Err(self.unexpected("expected an expression"));
        };
        match &span.token {
            Token::Number(n) => Ok((Expr::Literal(crate::value::number_value(*n)), 1)),
            Token::Str(s) => Ok((Expr::Literal(Value::String(s.clone())), 1)),
            Token::Identifier(name) => {
                let expr = match name.as_str() {
                    "true" => Expr::Literal(Value::Bool(true)),
                    "false" => Expr::Literal(Value::Bool(false)),
                    "null" | "undefined" => Expr::Literal(Value::Null),
                    _ => Expr::Identifier(name.clone()),
                };
                Ok((expr, 1))
            }
            Token::Delimiter(Delimiter::OpenParen) => {
                let parsed = self.parse_expression()?;
                self.expect_delimiter(Delimiter::CloseParen)?;
                Ok(parsed)
            }
            Token::Delimiter(Delimiter::OpenBracket) => {
                let (items, items_height) = self.parse_list(Delimiter::CloseBracket)?;
                Ok((Expr::Array(items), self.grow(items_height)?))
            }
            Token::Delimiter(Delimiter::OpenBrace) => self.parse_object(),
            other => Err(SyntaxError::new(
                format!("unexpected token `{}`", describe(other)),
                span.start,
            )),
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    /// Also yields the height of the tallest item.
    fn parse_list(&mut self, close: Delimiter) -> Result<(Vec<Expr>, usize), SyntaxError> {
        let mut items = Vec::new();
        let mut tallest = 0;
        loop {
            if self.eat_delimiter(close) {
                return Ok((items, tallest));
            }
            let (item, height) = self.parse_expression()?;
            tallest = tallest.max(height);
            items.push(item);
            if !self.eat_delimiter(Delimiter::Comma) {
                self.expect_delimiter(close)?;
                return Ok((items, tallest));
            }
        }
    }

    fn parse_object(&mut self) -> Parsed {
        let mut entries = Vec::new();
        let mut tallest = 0;
        loop {
            if self.eat_delimiter(Delimiter::CloseBrace) {
                break;
            }
            let key_span = self.advance();
            let key = match key_span.map(|s| &s.token) {
                Some(Token::Identifier(name)) => name.clone(),
                Some(Token::Str(s)) => s.clone(),
                Some(Token::Number(n)) => crate::value::to_display_string(&crate::value::number_value(*n)),
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.unexpected("expected a property name"));
                }
            };
            let (value, height) = if self.eat_delimiter(Delimiter::Colon) {
                self.parse_expression()?
            } else {
                // Shorthand `{ name }`
                (Expr::Identifier(key.clone()), 1)
            };
            tallest = tallest.max(height);
            entries.push((key, value));
            if !self.eat_delimiter(Delimiter::Comma) {
                self.expect_delimiter(Delimiter::CloseBrace)?;
                break;
            }
        }
        let height = self.grow(tallest)?;
        Ok((Expr::Object(entries), height))
    }

    fn expect_property_name(&mut self) -> Result<String, SyntaxError> {
        match self.peek() {
            Some(TokenSpan {
                token: Token::Identifier(name),
                ..
            }) => {
                self.pos += 1;
                Ok(name.clone())
            }
            _ => Err(self.unexpected("expected a property name")),
        }
    }

    fn peek_operator(&self) -> Option<Operator> {
        match self.peek() {
            Some(TokenSpan {
                token: Token::Operator(op),
                ..
            }) => Some(*op),
            _ => None,
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => n.to_string(),
        Token::Str(s) => format!("'{}'", s),
        Token::Identifier(name) => name.clone(),
        Token::Operator(op) => op.to_string(),
        Token::Delimiter(d) => d.to_string(),
    }
}
