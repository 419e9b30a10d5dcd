//! Lexer for Wabbit source text.
//!
//! The lexer is a forward cursor over the source string. Whitespace and
//! both comment styles (`// ...` to end of line, `/* ... */` without
//! nesting) are discarded. Token-level scanning (numbers, identifiers,
//! operators) is expressed with `nom` combinators over the remaining
//! input; the cursor tracks line and column as it consumes text.
//!
//! A leading minus is never part of a numeric literal; unary `-` is left
//! to the parser.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1, take_while_m_n},
    character::complete::char,
    combinator::{opt, recognize, value},
    IResult, Parser,
};
use wabbit_ast::{Diagnostic, DiagnosticKind, Pos};

use crate::token::{keyword_kind, Token, TokenKind};

/// Lexical error categories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexErrorKind {
    /// `/*` with no closing `*/`.
    UnterminatedComment,
    /// A character outside the language's alphabet.
    InvalidChar(char),
    /// A numeric literal that does not fit its type or is malformed.
    BadNumber,
}

/// A lexical error with its source position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexError {
    pub pos: Pos,
    pub kind: LexErrorKind,
}

impl LexError {
    fn new(pos: Pos, kind: LexErrorKind) -> Self {
        Self { pos, kind }
    }

    /// Convert into a user-facing diagnostic.
    pub fn into_diagnostic(self) -> Diagnostic {
        let message = match self.kind {
            LexErrorKind::UnterminatedComment => "unterminated block comment".to_string(),
            LexErrorKind::InvalidChar(ch) => format!("invalid character {ch:?}"),
            LexErrorKind::BadNumber => "malformed numeric literal".to_string(),
        };
        Diagnostic::new(self.pos, DiagnosticKind::Lex, message)
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LexErrorKind::UnterminatedComment => write!(f, "{}: unterminated block comment", self.pos),
            LexErrorKind::InvalidChar(ch) => write!(f, "{}: invalid character {ch:?}", self.pos),
            LexErrorKind::BadNumber => write!(f, "{}: malformed numeric literal", self.pos),
        }
    }
}

/// Tokenize a whole source string. The result always ends with one
/// [`TokenKind::Eof`] token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }
    log::trace!("lexed {} tokens", tokens.len());
    Ok(tokens)
}

/// Forward token scanner with line/column tracking.
pub struct Lexer<'a> {
    rest: &'a str,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    /// Create a lexer at the start of `source`.
    pub fn new(source: &'a str) -> Self {
        Self {
            rest: source,
            line: 1,
            col: 1,
        }
    }

    /// Produce the next token, or [`TokenKind::Eof`] at end of input.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let pos = self.pos();

        if self.rest.is_empty() {
            return Ok(Token::new(TokenKind::Eof, "", pos));
        }

        if let Ok((after, (lexeme, is_float))) = number(self.rest) {
            // A second dot directly after the literal is always a mistake
            // (`1.2.3`), not the start of another token.
            if after.starts_with('.') {
                return Err(LexError::new(pos, LexErrorKind::BadNumber));
            }
            let kind = if is_float {
                lexeme
                    .parse::<f64>()
                    .map_err(|_| LexError::new(pos, LexErrorKind::BadNumber))?;
                TokenKind::Float
            } else {
                lexeme
                    .parse::<i64>()
                    .map_err(|_| LexError::new(pos, LexErrorKind::BadNumber))?;
                TokenKind::Int
            };
            let token = Token::new(kind, lexeme, pos);
            self.consume(lexeme.len());
            return Ok(token);
        }

        if let Ok((_, lexeme)) = identifier(self.rest) {
            let kind = keyword_kind(lexeme).unwrap_or(TokenKind::Ident);
            let token = Token::new(kind, lexeme, pos);
            self.consume(lexeme.len());
            return Ok(token);
        }

        if let Ok((after, kind)) = operator(self.rest) {
            let len = self.rest.len() - after.len();
            let token = Token::new(kind, &self.rest[..len], pos);
            self.consume(len);
            return Ok(token);
        }

        let ch = self.rest.chars().next().unwrap_or('\0');
        Err(LexError::new(pos, LexErrorKind::InvalidChar(ch)))
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    /// Skip whitespace and comments. Fails on an unterminated `/*`.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            let before = self.rest.len();

            let ws_len = self.rest.len() - self.rest.trim_start().len();
            self.consume(ws_len);

            if self.rest.starts_with("//") {
                match self.rest.find('\n') {
                    Some(end) => self.consume(end + 1),
                    None => self.consume(self.rest.len()),
                }
                continue;
            }

            if self.rest.starts_with("/*") {
                let pos = self.pos();
                match self.rest.find("*/") {
                    Some(end) => self.consume(end + 2),
                    None => return Err(LexError::new(pos, LexErrorKind::UnterminatedComment)),
                }
                continue;
            }

            if self.rest.len() == before {
                return Ok(());
            }
        }
    }

    /// Advance the cursor by `len` bytes, updating line and column.
    fn consume(&mut self, len: usize) {
        let consumed = &self.rest[..len];
        for ch in consumed.chars() {
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        self.rest = &self.rest[len..];
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

/// Scan a numeric literal: `123`, `1.25`, `1.`, or `.5`. Returns the
/// lexeme and whether it is a float.
fn number(input: &str) -> IResult<&str, (&str, bool)> {
    let (rest, lexeme) = alt((
        recognize((
            take_while1(is_digit),
            opt((char('.'), take_while(is_digit))),
        )),
        recognize((char('.'), take_while1(is_digit))),
    ))
    .parse(input)?;
    Ok((rest, (lexeme, lexeme.contains('.'))))
}

/// Scan an identifier: `[A-Za-z_][A-Za-z_0-9]*`.
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize((
        take_while_m_n(1, 1, is_ident_start),
        take_while(is_ident_char),
    ))
    .parse(input)
}

/// Scan an operator or punctuation token. Two-character operators are
/// tried before their one-character prefixes.
fn operator(input: &str) -> IResult<&str, TokenKind> {
    alt((
        alt((
            value(TokenKind::Le, tag("<=")),
            value(TokenKind::Ge, tag(">=")),
            value(TokenKind::EqEq, tag("==")),
            value(TokenKind::NotEq, tag("!=")),
            value(TokenKind::AndAnd, tag("&&")),
            value(TokenKind::OrOr, tag("||")),
        )),
        alt((
            value(TokenKind::Plus, tag("+")),
            value(TokenKind::Minus, tag("-")),
            value(TokenKind::Star, tag("*")),
            value(TokenKind::Slash, tag("/")),
            value(TokenKind::Lt, tag("<")),
            value(TokenKind::Gt, tag(">")),
            value(TokenKind::Assign, tag("=")),
            value(TokenKind::Not, tag("!")),
            value(TokenKind::Caret, tag("^")),
            value(TokenKind::Backtick, tag("`")),
        )),
        alt((
            value(TokenKind::LParen, tag("(")),
            value(TokenKind::RParen, tag(")")),
            value(TokenKind::LBrace, tag("{")),
            value(TokenKind::RBrace, tag("}")),
            value(TokenKind::Comma, tag(",")),
            value(TokenKind::Semi, tag(";")),
        )),
    ))
    .parse(input)
}
