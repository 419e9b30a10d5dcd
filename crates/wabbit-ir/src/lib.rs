//! Stack-machine IR for the Wabbit compiler.
//!
//! This crate defines the intermediate representation shared by every
//! back-end, the generator that lowers a checked AST into it, and an
//! interpreter used for quick experimentation and as the semantic
//! reference for the compiled back-ends.

#![no_std]
#![forbid(unsafe_code)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
mod instr;
#[cfg(feature = "alloc")]
mod interp;
#[cfg(feature = "alloc")]
mod lower;

#[cfg(feature = "alloc")]
pub use instr::{
    FuncRef, Instruction, IrConst, IrFunction, IrGlobal, IrImport, IrModule, Slot, Storage,
    TypeTag, PAGE_SIZE,
};
#[cfg(feature = "alloc")]
pub use interp::{Machine, Value, VmError, VmErrorKind};
#[cfg(feature = "alloc")]
pub use lower::lower_program;
