//! LLVM IR text back-end for the Wabbit compiler.
//!
//! This crate translates a compiled IR module into textual LLVM IR. The
//! output references the external functions `_printi(i32)` and
//! `_printf(double)` linked from a small C runtime, and defines `main`
//! returning `i32`, so `clang runtime.c out.ll` produces a native
//! executable.

#![no_std]
#![forbid(unsafe_code)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
mod llvm;

#[cfg(feature = "alloc")]
pub use llvm::{generate_module, generate_module_with, LlvmOptions};

#[cfg(feature = "alloc")]
use alloc::string::String;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;
#[cfg(feature = "alloc")]
use wabbit_ast::Diagnostic;

/// Compile Wabbit source text to LLVM IR text.
#[cfg(feature = "alloc")]
pub fn compile_to_llvm(source: &str) -> Result<String, Vec<Diagnostic>> {
    let program =
        wabbit_parser::parse_program(source).map_err(|err| alloc::vec![err.into_diagnostic()])?;
    let typed = wabbit_ast::check_program(&program)?;
    let module = wabbit_ir::lower_program(&typed);
    Ok(generate_module(&module))
}
