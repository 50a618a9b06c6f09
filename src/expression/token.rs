//! Lexer for the expression language.
//!
//! Operators are matched longest first so that `===` is never read as `==`
//! followed by `=`, and `?.` wins over `?` for optional chaining.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, one_of},
    combinator::{map, map_res, opt, recognize, value},
    error::{context, ErrorKind, ParseError, VerboseError},
    sequence::{pair, tuple},
    IResult,
};
use strum_macros::{AsRefStr, Display};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Identifier(String),
    Operator(Operator),
    Delimiter(Delimiter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum Operator {
    #[strum(serialize = "===")]
    StrictEqual,
    #[strum(serialize = "!==")]
    StrictNotEqual,
    #[strum(serialize = "==")]
    EqualEqual,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "??")]
    Nullish,
    #[strum(serialize = "?.")]
    OptionalDot,
    #[strum(serialize = "?")]
    Question,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = ".")]
    Dot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Comma,
    Colon,
}

impl Delimiter {
    pub fn as_char(&self) -> char {
        match self {
            Self::OpenParen => '(',
            Self::CloseParen => ')',
            Self::OpenBracket => '[',
            Self::CloseBracket => ']',
            Self::OpenBrace => '{',
            Self::CloseBrace => '}',
            Self::Comma => ',',
            Self::Colon => ':',
        }
    }
}

impl std::fmt::Display for Delimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub position: usize,
}

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Splits an expression into spanned tokens. Whitespace is discarded.
pub fn tokenize(input: &str) -> Result<Vec<TokenSpan>, LexError> {
    let mut tokens = Vec::new();
    let mut remaining = input;

    loop {
        // multispace0 cannot fail
        if let Ok((rest, _)) = multispace0::<&str, VerboseError<&str>>(remaining) {
            remaining = rest;
        }
        if remaining.is_empty() {
            break;
        }
        let start = input.len() - remaining.len();

        match alt((
            parse_number,
            parse_string,
            parse_operator,
            parse_delimiter,
            parse_identifier,
        ))(remaining)
        {
            Ok((rest, token)) => {
                tokens.push(TokenSpan {
                    token,
                    start,
                    end: input.len() - rest.len(),
                });
                remaining = rest;
            }
            Err(_) => {
                let found: String = remaining.chars().take(12).collect();
                return Err(LexError {
                    message: format!("unexpected input `{}`", found),
                    position: start,
                });
            }
        }
    }

    Ok(tokens)
}

fn parse_number(input: &str) -> ParserResult<Token> {
    context(
        "number",
        map_res(
            recognize(tuple((
                digit1,
                opt(pair(char('.'), digit1)),
                opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
            ))),
            |s: &str| s.parse::<f64>().map(Token::Number),
        ),
    )(input)
}

/// Single- or double-quoted string with backslash escapes.
fn parse_string(input: &str) -> ParserResult<Token> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, q @ ('"' | '\''))) => q,
        _ => return Err(nom::Err::Error(VerboseError::from_error_kind(input, ErrorKind::Char))),
    };

    let mut text = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((&input[i + c.len_utf8()..], Token::Str(text))),
            '\\' => {
                let Some((_, escaped)) = chars.next() else {
                    break;
                };
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
            }
            other => text.push(other),
        }
    }

    // Unterminated: fail hard so the identifier parser does not retry.
    Err(nom::Err::Failure(VerboseError::from_error_kind(
        input,
        ErrorKind::Char,
    )))
}

fn parse_operator(input: &str) -> ParserResult<Token> {
    context(
        "operator",
        map(
            alt((
                alt((
                    value(Operator::StrictEqual, tag("===")),
                    value(Operator::StrictNotEqual, tag("!==")),
                    value(Operator::EqualEqual, tag("==")),
                    value(Operator::NotEqual, tag("!=")),
                    value(Operator::GreaterEqual, tag(">=")),
                    value(Operator::LessEqual, tag("<=")),
                    value(Operator::And, tag("&&")),
                    value(Operator::Or, tag("||")),
                    value(Operator::Nullish, tag("??")),
                    value(Operator::OptionalDot, tag("?.")),
                )),
                alt((
                    value(Operator::Greater, tag(">")),
                    value(Operator::Less, tag("<")),
                    value(Operator::Question, tag("?")),
                    value(Operator::Not, tag("!")),
                    value(Operator::Plus, tag("+")),
                    value(Operator::Minus, tag("-")),
                    value(Operator::Multiply, tag("*")),
                    value(Operator::Divide, tag("/")),
                    value(Operator::Modulo, tag("%")),
                    value(Operator::Dot, tag(".")),
                )),
            )),
            Token::Operator,
        ),
    )(input)
}

fn parse_delimiter(input: &str) -> ParserResult<Token> {
    context(
        "delimiter",
        map(
            alt((
                value(Delimiter::OpenParen, char('(')),
                value(Delimiter::CloseParen, char(')')),
                value(Delimiter::OpenBracket, char('[')),
                value(Delimiter::CloseBracket, char(']')),
                value(Delimiter::OpenBrace, char('{')),
                value(Delimiter::CloseBrace, char('}')),
                value(Delimiter::Comma, char(',')),
                value(Delimiter::Colon, char(':')),
            )),
            Token::Delimiter,
        ),
    )(input)
}

fn parse_identifier(input: &str) -> ParserResult<Token> {
    context(
        "identifier",
        map(
            recognize(pair(
                take_while1(|c: char| c.is_alphabetic() || c == '_' || c == '$'),
                take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$'),
            )),
            |id: &str| Token::Identifier(id.to_string()),
        ),
    )(input)
}
