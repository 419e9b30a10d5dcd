//! Lexer and parser for the Wabbit programming language.
//!
//! This crate turns Wabbit source text into the AST defined by
//! `wabbit-ast`. Lexical scanning is built on the `nom` parsing library;
//! statements are parsed by recursive descent and expressions by
//! precedence climbing.

#![no_std]
#![forbid(unsafe_code)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
mod lexer;
#[cfg(feature = "alloc")]
mod parser;
#[cfg(feature = "alloc")]
mod token;

#[cfg(feature = "alloc")]
pub use lexer::{tokenize, LexError, LexErrorKind, Lexer};
#[cfg(feature = "alloc")]
pub use parser::{parse_program, ParseError, SyntaxError};
#[cfg(feature = "alloc")]
pub use token::{Token, TokenKind};
