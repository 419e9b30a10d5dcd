//! IR to WebAssembly binary module translation.
//!
//! The emitted module carries sections 1 (types), 2 (imports), 3
//! (functions), 5 (memory, when any memory instruction was generated),
//! 6 (globals), 7 (exports), and 10 (code), in that order.
//!
//! Index spaces follow the format's rules: imports occupy the low
//! function indices starting at 0 and defined functions follow. The two
//! host print functions `env._printi(i32)` and `env._printf(f64)` are
//! always imported first (indices 0 and 1), with user imports after
//! them. The entry function is exported as `"main"`, and the linear
//! memory as `"memory"` when present.
//!
//! IR ints (including booleans) become `i32`; floats become `f64`.

use alloc::vec::Vec;

use wabbit_ir::{
    FuncRef, Instruction, IrConst, IrFunction, IrGlobal, IrModule, Storage, TypeTag, PAGE_SIZE,
};

use crate::encode;

/// Value type bytes.
const I32: u8 = 0x7f;
const F64: u8 = 0x7c;

/// Opcode bytes used by the translation.
mod opcode {
    pub const BLOCK: u8 = 0x02;
    pub const LOOP: u8 = 0x03;
    pub const IF: u8 = 0x04;
    pub const ELSE: u8 = 0x05;
    pub const END: u8 = 0x0b;
    pub const BR: u8 = 0x0c;
    pub const BR_IF: u8 = 0x0d;
    pub const RETURN: u8 = 0x0f;
    pub const CALL: u8 = 0x10;
    pub const DROP: u8 = 0x1a;
    pub const LOCAL_GET: u8 = 0x20;
    pub const LOCAL_SET: u8 = 0x21;
    pub const GLOBAL_GET: u8 = 0x23;
    pub const GLOBAL_SET: u8 = 0x24;
    pub const I32_LOAD: u8 = 0x28;
    pub const I32_STORE: u8 = 0x36;
    pub const MEMORY_SIZE: u8 = 0x3f;
    pub const MEMORY_GROW: u8 = 0x40;
    pub const I32_CONST: u8 = 0x41;
    pub const F64_CONST: u8 = 0x44;
    pub const I32_EQZ: u8 = 0x45;
    pub const I32_EQ: u8 = 0x46;
    pub const I32_NE: u8 = 0x47;
    pub const I32_LT_S: u8 = 0x48;
    pub const I32_GT_S: u8 = 0x4a;
    pub const I32_LE_S: u8 = 0x4c;
    pub const I32_GE_S: u8 = 0x4e;
    pub const F64_EQ: u8 = 0x61;
    pub const F64_NE: u8 = 0x62;
    pub const F64_LT: u8 = 0x63;
    pub const F64_GT: u8 = 0x64;
    pub const F64_LE: u8 = 0x65;
    pub const F64_GE: u8 = 0x66;
    pub const I32_ADD: u8 = 0x6a;
    pub const I32_SUB: u8 = 0x6b;
    pub const I32_MUL: u8 = 0x6c;
    pub const I32_DIV_S: u8 = 0x6d;
    pub const I32_DIV_U: u8 = 0x6e;
    pub const I32_AND: u8 = 0x71;
    pub const I32_OR: u8 = 0x72;
    pub const I32_XOR: u8 = 0x73;
    pub const F64_ADD: u8 = 0xa0;
    pub const F64_SUB: u8 = 0xa1;
    pub const F64_MUL: u8 = 0xa2;
    pub const F64_DIV: u8 = 0xa3;
    pub const I32_TRUNC_F64_S: u8 = 0xaa;
    pub const F64_CONVERT_I32_S: u8 = 0xb7;
}

/// Empty block type.
const BLOCKTYPE_EMPTY: u8 = 0x40;

/// Function index of `env._printi`.
const PRINTI_INDEX: u32 = 0;
/// Function index of `env._printf`.
const PRINTF_INDEX: u32 = 1;
/// Number of always-present host imports.
const HOST_IMPORTS: u32 = 2;

/// Generate a complete `.wasm` binary module.
pub fn generate_module(module: &IrModule) -> Vec<u8> {
    let mut types = TypeTable::default();

    // Host print imports occupy indices 0 and 1; their signatures claim
    // the first type indices.
    let printi_type = types.index_of(&[I32], &[]);
    let printf_type = types.index_of(&[F64], &[]);

    let mut import_entries = Vec::new();
    import_entries.push(import_entry("_printi", printi_type));
    import_entries.push(import_entry("_printf", printf_type));
    for import in &module.imports {
        let params = valtypes(&import.params);
        let results = result_types(import.ret);
        let type_index = types.index_of(&params, &results);
        import_entries.push(import_entry(&import.name, type_index));
    }

    let mut func_entries = Vec::new();
    for func in &module.funcs {
        let params = valtypes(&func.params.iter().map(|(_, tag)| *tag).collect::<Vec<_>>());
        let results = result_types(func.ret);
        func_entries.push(encode::unsigned(types.index_of(&params, &results) as u64));
    }

    let global_entries: Vec<Vec<u8>> = module.globals.iter().map(global_entry).collect();

    let mut export_entries = Vec::new();
    let entry_index = HOST_IMPORTS + module.imports.len() as u32 + module.entry;
    let mut main_export = encode::name("main");
    main_export.push(0x00);
    main_export.extend_from_slice(&encode::unsigned(entry_index as u64));
    export_entries.push(main_export);
    if module.uses_memory {
        let mut memory_export = encode::name("memory");
        memory_export.push(0x02);
        memory_export.extend_from_slice(&encode::unsigned(0));
        export_entries.push(memory_export);
    }

    let code_entries: Vec<Vec<u8>> = module
        .funcs
        .iter()
        .map(|func| code_entry(module, func))
        .collect();

    let mut out = Vec::new();
    out.extend_from_slice(b"\0asm\x01\x00\x00\x00");
    out.extend_from_slice(&encode::section(1, &types.contents()));
    out.extend_from_slice(&encode::section(2, &encode::vector(&import_entries)));
    out.extend_from_slice(&encode::section(3, &encode::vector(&func_entries)));
    if module.uses_memory {
        // One memory with a one-page minimum; programs grow it with `^`.
        let mut memtype = Vec::new();
        memtype.push(0x00);
        memtype.extend_from_slice(&encode::unsigned(1));
        out.extend_from_slice(&encode::section(5, &encode::vector(&[memtype])));
    }
    out.extend_from_slice(&encode::section(6, &encode::vector(&global_entries)));
    out.extend_from_slice(&encode::section(7, &encode::vector(&export_entries)));
    out.extend_from_slice(&encode::section(10, &encode::vector(&code_entries)));

    log::debug!(
        "emitted wasm module: {} bytes, {} types, {} imports, {} functions",
        out.len(),
        types.len(),
        import_entries.len(),
        module.funcs.len()
    );
    out
}

/// Deduplicating function-signature table backing section 1.
#[derive(Default)]
struct TypeTable {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl TypeTable {
    /// Index of a signature, interning it on first use.
    fn index_of(&mut self, params: &[u8], results: &[u8]) -> u32 {
        if let Some(index) = self
            .entries
            .iter()
            .position(|(p, r)| p.as_slice() == params && r.as_slice() == results)
        {
            return index as u32;
        }
        self.entries.push((params.to_vec(), results.to_vec()));
        (self.entries.len() - 1) as u32
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contents(&self) -> Vec<u8> {
        let encoded: Vec<Vec<u8>> = self
            .entries
            .iter()
            .map(|(params, results)| {
                let mut sig = Vec::new();
                sig.push(0x60);
                sig.extend_from_slice(&encode::byte_vector(params));
                sig.extend_from_slice(&encode::byte_vector(results));
                sig
            })
            .collect();
        encode::vector(&encoded)
    }
}

fn valtype(tag: TypeTag) -> u8 {
    match tag {
        TypeTag::I => I32,
        TypeTag::F => F64,
    }
}

fn valtypes(tags: &[TypeTag]) -> Vec<u8> {
    tags.iter().map(|tag| valtype(*tag)).collect()
}

fn result_types(ret: Option<TypeTag>) -> Vec<u8> {
    ret.map(valtype).into_iter().collect()
}

/// An `env.<name>` function import record.
fn import_entry(field: &str, type_index: u32) -> Vec<u8> {
    let mut out = encode::name("env");
    out.extend_from_slice(&encode::name(field));
    out.push(0x00);
    out.extend_from_slice(&encode::unsigned(type_index as u64));
    out
}

/// A global record: type, mutability, and constant init expression.
fn global_entry(global: &IrGlobal) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(valtype(global.tag));
    out.push(0x01); // mutable
    match global.tag {
        TypeTag::I => {
            let n = match global.init {
                Some(IrConst::I(n)) => n,
                _ => 0,
            };
            out.push(opcode::I32_CONST);
            out.extend_from_slice(&encode::signed(n as i32 as i64));
        }
        TypeTag::F => {
            let x = match global.init {
                Some(IrConst::F(x)) => x,
                _ => 0.0,
            };
            out.push(opcode::F64_CONST);
            out.extend_from_slice(&encode::float64(x));
        }
    }
    out.push(opcode::END);
    out
}

/// A section-10 code record: locals declaration runs plus the body.
fn code_entry(module: &IrModule, func: &IrFunction) -> Vec<u8> {
    // Group consecutive locals of the same type into (count, type) runs.
    let mut runs: Vec<(u32, u8)> = Vec::new();
    for (_, tag) in &func.locals {
        let ty = valtype(*tag);
        match runs.last_mut() {
            Some((count, last)) if *last == ty => *count += 1,
            _ => runs.push((1, ty)),
        }
    }
    let encoded_runs: Vec<Vec<u8>> = runs
        .iter()
        .map(|(count, ty)| {
            let mut run = encode::unsigned(*count as u64);
            run.push(*ty);
            run
        })
        .collect();

    let mut body = encode::vector(&encoded_runs);
    body.extend_from_slice(&translate_body(module, func));
    encode::byte_vector(&body)
}

/// Control constructs open at a given point of the translation.
enum Ctrl {
    /// The `block` wrapped around each loop; `CBREAK` targets it.
    Block,
    Loop,
    If,
}

/// Translate one function's instruction stream into Wasm code bytes.
fn translate_body(module: &IrModule, func: &IrFunction) -> Vec<u8> {
    use opcode::*;

    let mut out = Vec::new();
    let mut ctrl: Vec<Ctrl> = Vec::new();

    // Relative branch depth of the frame at stack position `p`.
    let depth = |ctrl: &[Ctrl], p: usize| (ctrl.len() - 1 - p) as u64;
    // Position of the innermost open loop.
    let innermost_loop = |ctrl: &[Ctrl]| {
        ctrl.iter()
            .rposition(|frame| matches!(frame, Ctrl::Loop))
            .expect("loop instruction outside LOOP")
    };

    for instruction in &func.code {
        match *instruction {
            Instruction::ConstI(n) => {
                out.push(I32_CONST);
                out.extend_from_slice(&encode::signed(n as i32 as i64));
            }
            Instruction::ConstF(x) => {
                out.push(F64_CONST);
                out.extend_from_slice(&encode::float64(x));
            }

            Instruction::AddI => out.push(I32_ADD),
            Instruction::SubI => out.push(I32_SUB),
            Instruction::MulI => out.push(I32_MUL),
            Instruction::DivI => out.push(I32_DIV_S),
            Instruction::AddF => out.push(F64_ADD),
            Instruction::SubF => out.push(F64_SUB),
            Instruction::MulF => out.push(F64_MUL),
            Instruction::DivF => out.push(F64_DIV),

            Instruction::LtI => out.push(I32_LT_S),
            Instruction::LeI => out.push(I32_LE_S),
            Instruction::GtI => out.push(I32_GT_S),
            Instruction::GeI => out.push(I32_GE_S),
            Instruction::EqI => out.push(I32_EQ),
            Instruction::NeI => out.push(I32_NE),
            Instruction::LtF => out.push(F64_LT),
            Instruction::LeF => out.push(F64_LE),
            Instruction::GtF => out.push(F64_GT),
            Instruction::GeF => out.push(F64_GE),
            Instruction::EqF => out.push(F64_EQ),
            Instruction::NeF => out.push(F64_NE),

            Instruction::AndI => out.push(I32_AND),
            Instruction::OrI => out.push(I32_OR),
            Instruction::XorI => out.push(I32_XOR),

            Instruction::Itof => out.push(F64_CONVERT_I32_S),
            Instruction::Ftoi => out.push(I32_TRUNC_F64_S),

            Instruction::PeekI => {
                out.push(I32_LOAD);
                out.extend_from_slice(&encode::unsigned(2)); // alignment
                out.extend_from_slice(&encode::unsigned(0)); // offset
            }
            Instruction::PokeI => {
                out.push(I32_STORE);
                out.extend_from_slice(&encode::unsigned(2));
                out.extend_from_slice(&encode::unsigned(0));
            }
            Instruction::GrowM => {
                // Round the byte count up to pages, grow by the missing
                // pages, and leave the new size in bytes.
                out.push(I32_CONST);
                out.extend_from_slice(&encode::signed((PAGE_SIZE - 1) as i64));
                out.push(I32_ADD);
                out.push(I32_CONST);
                out.extend_from_slice(&encode::signed(PAGE_SIZE as i64));
                out.push(I32_DIV_U);
                out.push(MEMORY_SIZE);
                out.push(0x00);
                out.push(I32_SUB);
                out.push(MEMORY_GROW);
                out.push(0x00);
                out.push(DROP);
                out.push(MEMORY_SIZE);
                out.push(0x00);
                out.push(I32_CONST);
                out.extend_from_slice(&encode::signed(PAGE_SIZE as i64));
                out.push(I32_MUL);
            }

            Instruction::Load(slot) => {
                out.push(match slot.storage {
                    Storage::Local => LOCAL_GET,
                    Storage::Global => GLOBAL_GET,
                });
                out.extend_from_slice(&encode::unsigned(slot.index as u64));
            }
            Instruction::Store(slot) => {
                out.push(match slot.storage {
                    Storage::Local => LOCAL_SET,
                    Storage::Global => GLOBAL_SET,
                });
                out.extend_from_slice(&encode::unsigned(slot.index as u64));
            }

            Instruction::If => {
                out.push(IF);
                out.push(BLOCKTYPE_EMPTY);
                ctrl.push(Ctrl::If);
            }
            Instruction::Else => {
                assert!(matches!(ctrl.last(), Some(Ctrl::If)), "ELSE outside IF");
                out.push(ELSE);
            }
            Instruction::EndIf => {
                assert!(matches!(ctrl.pop(), Some(Ctrl::If)), "ENDIF outside IF");
                out.push(END);
            }

            Instruction::Loop => {
                out.push(BLOCK);
                out.push(BLOCKTYPE_EMPTY);
                out.push(LOOP);
                out.push(BLOCKTYPE_EMPTY);
                ctrl.push(Ctrl::Block);
                ctrl.push(Ctrl::Loop);
            }
            Instruction::CBreak => {
                // IR semantics: leave the loop iff the popped value is
                // false. `br_if` branches on true, so invert first.
                let target = innermost_loop(&ctrl) - 1;
                out.push(I32_EQZ);
                out.push(BR_IF);
                out.extend_from_slice(&encode::unsigned(depth(&ctrl, target)));
            }
            Instruction::Continue => {
                let target = innermost_loop(&ctrl);
                out.push(BR);
                out.extend_from_slice(&encode::unsigned(depth(&ctrl, target)));
            }
            Instruction::EndLoop => {
                // Unconditional back edge to the loop head, then close the
                // loop and its wrapping block.
                out.push(BR);
                out.extend_from_slice(&encode::unsigned(0));
                out.push(END);
                out.push(END);
                assert!(matches!(ctrl.pop(), Some(Ctrl::Loop)), "ENDLOOP outside LOOP");
                assert!(matches!(ctrl.pop(), Some(Ctrl::Block)), "ENDLOOP outside LOOP");
            }

            Instruction::Call(target) => {
                let index = match target {
                    FuncRef::Import(i) => HOST_IMPORTS + i,
                    FuncRef::Func(i) => HOST_IMPORTS + module.imports.len() as u32 + i,
                };
                out.push(CALL);
                out.extend_from_slice(&encode::unsigned(index as u64));
            }
            Instruction::Ret => out.push(RETURN),

            Instruction::PrintI => {
                out.push(CALL);
                out.extend_from_slice(&encode::unsigned(PRINTI_INDEX as u64));
            }
            Instruction::PrintF => {
                out.push(CALL);
                out.extend_from_slice(&encode::unsigned(PRINTF_INDEX as u64));
            }
        }
    }

    assert!(ctrl.is_empty(), "unclosed control construct in '{}'", func.name);
    out.push(opcode::END);
    out
}
