//! WebAssembly back-end for the Wabbit compiler.
//!
//! This crate encodes a compiled IR module as a WebAssembly 1.0 binary,
//! with no secondary tools: LEB128 and section framing are produced
//! directly.
//!
//! ## Host contract
//!
//! The embedder must supply two imports, `env._printi(i32)` and
//! `env._printf(f64)`, and call the exported `"main"` function to obtain
//! an `i32`. When the program uses raw memory, the linear memory is
//! exported as `"memory"`.

#![no_std]
#![forbid(unsafe_code)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
mod codegen;
#[cfg(feature = "alloc")]
pub mod encode;

#[cfg(feature = "alloc")]
pub use codegen::generate_module;

#[cfg(feature = "alloc")]
use alloc::vec::Vec;
#[cfg(feature = "alloc")]
use wabbit_ast::Diagnostic;

/// Compile Wabbit source text to a `.wasm` binary.
#[cfg(feature = "alloc")]
pub fn compile_to_wasm(source: &str) -> Result<Vec<u8>, Vec<Diagnostic>> {
    let program =
        wabbit_parser::parse_program(source).map_err(|err| alloc::vec![err.into_diagnostic()])?;
    let typed = wabbit_ast::check_program(&program)?;
    let module = wabbit_ir::lower_program(&typed);
    Ok(generate_module(&module))
}
