//! AST types and semantic analysis for the Wabbit programming language.
//!
//! This crate provides the abstract syntax tree representation for Wabbit
//! programs, the closed `Type` set, the operator signature tables, and the
//! two-pass semantic checker that resolves names and annotates every
//! expression with its type.
//!
//! The checker's output, [`TypedProgram`], is the contract consumed by the
//! IR generator: every name is resolved to a storage slot or function
//! index, and every expression carries a concrete type.

#![no_std]
#![forbid(unsafe_code)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
mod ast;
#[cfg(feature = "alloc")]
mod check;
#[cfg(feature = "alloc")]
mod diag;
#[cfg(feature = "alloc")]
mod ops;
#[cfg(feature = "alloc")]
mod typed;

#[cfg(feature = "alloc")]
pub use ast::*;
#[cfg(feature = "alloc")]
pub use check::check_program;
#[cfg(feature = "alloc")]
pub use diag::{Diagnostic, DiagnosticKind, Pos};
#[cfg(feature = "alloc")]
pub use ops::{binary_result_type, cast_result_type, unary_result_type};
#[cfg(feature = "alloc")]
pub use typed::*;
