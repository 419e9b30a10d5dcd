//! LLVM IR text generator.
//!
//! Translates a compiled IR module into textual LLVM IR suitable for
//! `clang`. The emitter simulates the IR machine's value stack with SSA
//! names: constants are pushed as immediates, every computing instruction
//! pops its operands and pushes a fresh temporary, and `CALL` pops its
//! arguments in reverse.
//!
//! Each parameter and local gets an `alloca` slot at function entry and
//! every `LOAD`/`STORE` targets that slot, so no SSA value ever crosses a
//! basic-block boundary. Control flow uses fresh blocks: `IF` creates
//! `then`/`else`/`endif`, `LOOP` creates `loop_hdr`/`loop_body`/
//! `loop_end`.
//!
//! Raw memory is an arena global plus a byte-count global; `GROWM` only
//! moves the byte count, in whole pages, exactly like the other
//! back-ends. `PRINTI`/`PRINTF` call external `_printi`/`_printf`
//! provided by a small C runtime.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use wabbit_ir::{FuncRef, Instruction, IrConst, IrFunction, IrModule, Storage, TypeTag, PAGE_SIZE};

/// Options for LLVM IR generation.
#[derive(Clone, Debug)]
pub struct LlvmOptions {
    /// Size in bytes of the arena backing raw memory. Rounded meaning:
    /// programs may grow memory up to this many bytes.
    pub memory_arena_bytes: u32,
}

impl Default for LlvmOptions {
    fn default() -> Self {
        Self {
            // 16 pages.
            memory_arena_bytes: 16 * PAGE_SIZE,
        }
    }
}

/// Generate LLVM IR text with default options.
pub fn generate_module(module: &IrModule) -> String {
    generate_module_with(module, &LlvmOptions::default())
}

/// Generate LLVM IR text.
pub fn generate_module_with(module: &IrModule, options: &LlvmOptions) -> String {
    let mut codegen = LlvmCodegen {
        module,
        arena_bytes: options.memory_arena_bytes,
        out: String::new(),
        stack: Vec::new(),
        ctrl: Vec::new(),
        tmp: 0,
        next_label: 0,
        terminated: false,
    };
    codegen.emit_module();
    log::debug!("emitted llvm module: {} bytes of text", codegen.out.len());
    codegen.out
}

/// An open structured-control construct.
enum Ctrl {
    If { id: u32 },
    Loop { id: u32, body_open: bool },
}

struct LlvmCodegen<'a> {
    module: &'a IrModule,
    arena_bytes: u32,
    out: String,
    /// Simulated value stack: SSA names or immediates, with their tags.
    stack: Vec<(String, TypeTag)>,
    ctrl: Vec<Ctrl>,
    tmp: u32,
    next_label: u32,
    /// Whether the current basic block already ended in a terminator.
    terminated: bool,
}

impl<'a> LlvmCodegen<'a> {
    // -- Module layout --

    fn emit_module(&mut self) {
        self.raw("; ModuleID = 'wabbit'");
        self.raw("");
        self.raw("declare void @_printi(i32)");
        self.raw("declare void @_printf(double)");
        for import in &self.module.imports {
            let params: Vec<String> = import.params.iter().map(|tag| ty(*tag).into()).collect();
            let line = format!(
                "declare {} @{}({})",
                ret_ty(import.ret),
                import.name,
                params.join(", ")
            );
            self.raw(&line);
        }
        self.raw("");

        for global in &self.module.globals {
            let line = match (global.tag, global.init) {
                (TypeTag::I, init) => {
                    let n = match init {
                        Some(IrConst::I(n)) => n as i32,
                        _ => 0,
                    };
                    format!("{} = global i32 {n}", global_name(&global.name))
                }
                (TypeTag::F, init) => {
                    let x = match init {
                        Some(IrConst::F(x)) => x,
                        _ => 0.0,
                    };
                    format!(
                        "{} = global double {}",
                        global_name(&global.name),
                        float_lit(x)
                    )
                }
            };
            self.raw(&line);
        }
        if !self.module.globals.is_empty() {
            self.raw("");
        }

        if self.module.uses_memory {
            let arena = self.arena_bytes;
            self.raw(&format!(
                "@wabbit.memory = global [{arena} x i8] zeroinitializer"
            ));
            self.raw(&format!("@wabbit.memsize = global i32 {PAGE_SIZE}"));
            self.raw("");
        }

        for func in &self.module.funcs {
            self.emit_function(func);
            self.raw("");
        }
    }

    fn emit_function(&mut self, func: &IrFunction) {
        self.stack.clear();
        self.ctrl.clear();
        self.tmp = 0;
        self.next_label = 0;
        self.terminated = false;

        let params: Vec<String> = func
            .params
            .iter()
            .enumerate()
            .map(|(i, (_, tag))| format!("{} %p{i}", ty(*tag)))
            .collect();
        self.raw(&format!(
            "define {} @{}({}) {{",
            ret_ty(func.ret),
            func.name,
            params.join(", ")
        ));
        self.raw("entry:");

        // One stack slot per parameter and local; loads and stores below
        // always go through these.
        for (slot, (name, tag)) in func.params.iter().chain(&func.locals).enumerate() {
            let slot_ty = ty(*tag);
            self.inst(&format!("{} = alloca {slot_ty}", slot_name(slot, name)));
        }
        for (i, (name, tag)) in func.params.iter().enumerate() {
            let slot_ty = ty(*tag);
            self.inst(&format!(
                "store {slot_ty} %p{i}, {slot_ty}* {}",
                slot_name(i, name)
            ));
        }

        for instruction in &func.code {
            self.emit_instruction(func, *instruction);
        }

        assert!(self.ctrl.is_empty(), "unclosed control construct in '{}'", func.name);
        self.raw("}");
    }

    // -- Instructions --

    fn emit_instruction(&mut self, func: &IrFunction, instruction: Instruction) {
        match instruction {
            Instruction::ConstI(n) => self.push(format!("{}", n as i32), TypeTag::I),
            Instruction::ConstF(x) => self.push(float_lit(x), TypeTag::F),

            Instruction::AddI => self.binary("add", TypeTag::I),
            Instruction::SubI => self.binary("sub", TypeTag::I),
            Instruction::MulI => self.binary("mul", TypeTag::I),
            Instruction::DivI => self.binary("sdiv", TypeTag::I),
            Instruction::AddF => self.binary("fadd", TypeTag::F),
            Instruction::SubF => self.binary("fsub", TypeTag::F),
            Instruction::MulF => self.binary("fmul", TypeTag::F),
            Instruction::DivF => self.binary("fdiv", TypeTag::F),

            Instruction::LtI => self.compare("icmp slt", TypeTag::I),
            Instruction::LeI => self.compare("icmp sle", TypeTag::I),
            Instruction::GtI => self.compare("icmp sgt", TypeTag::I),
            Instruction::GeI => self.compare("icmp sge", TypeTag::I),
            Instruction::EqI => self.compare("icmp eq", TypeTag::I),
            Instruction::NeI => self.compare("icmp ne", TypeTag::I),
            Instruction::LtF => self.compare("fcmp olt", TypeTag::F),
            Instruction::LeF => self.compare("fcmp ole", TypeTag::F),
            Instruction::GtF => self.compare("fcmp ogt", TypeTag::F),
            Instruction::GeF => self.compare("fcmp oge", TypeTag::F),
            Instruction::EqF => self.compare("fcmp oeq", TypeTag::F),
            Instruction::NeF => self.compare("fcmp one", TypeTag::F),

            Instruction::AndI => self.binary("and", TypeTag::I),
            Instruction::OrI => self.binary("or", TypeTag::I),
            Instruction::XorI => self.binary("xor", TypeTag::I),

            Instruction::Itof => {
                let (value, _) = self.pop();
                let result = self.fresh();
                self.inst(&format!("{result} = sitofp i32 {value} to double"));
                self.push(result, TypeTag::F);
            }
            Instruction::Ftoi => {
                let (value, _) = self.pop();
                let result = self.fresh();
                self.inst(&format!("{result} = fptosi double {value} to i32"));
                self.push(result, TypeTag::I);
            }

            Instruction::PeekI => {
                let (addr, _) = self.pop();
                let ptr = self.mem_ptr(&addr);
                let result = self.fresh();
                self.inst(&format!("{result} = load i32, i32* {ptr}"));
                self.push(result, TypeTag::I);
            }
            Instruction::PokeI => {
                let (value, _) = self.pop();
                let (addr, _) = self.pop();
                let ptr = self.mem_ptr(&addr);
                self.inst(&format!("store i32 {value}, i32* {ptr}"));
            }
            Instruction::GrowM => self.emit_grow(),

            Instruction::Load(slot) => {
                let (ptr, tag) = self.slot_ptr(func, slot.storage, slot.index);
                let slot_ty = ty(tag);
                let result = self.fresh();
                self.inst(&format!("{result} = load {slot_ty}, {slot_ty}* {ptr}"));
                self.push(result, tag);
            }
            Instruction::Store(slot) => {
                let (value, _) = self.pop();
                let (ptr, tag) = self.slot_ptr(func, slot.storage, slot.index);
                let slot_ty = ty(tag);
                self.inst(&format!("store {slot_ty} {value}, {slot_ty}* {ptr}"));
            }

            Instruction::If => {
                let id = self.fresh_label();
                let (cond, _) = self.pop();
                let flag = self.fresh();
                self.inst(&format!("{flag} = icmp ne i32 {cond}, 0"));
                self.inst(&format!("br i1 {flag}, label %then{id}, label %else{id}"));
                self.open_label(&format!("then{id}"));
                self.ctrl.push(Ctrl::If { id });
            }
            Instruction::Else => {
                let id = match self.ctrl.last() {
                    Some(Ctrl::If { id }) => *id,
                    _ => panic!("ELSE outside IF"),
                };
                self.inst(&format!("br label %endif{id}"));
                self.open_label(&format!("else{id}"));
            }
            Instruction::EndIf => {
                let id = match self.ctrl.pop() {
                    Some(Ctrl::If { id }) => id,
                    _ => panic!("ENDIF outside IF"),
                };
                self.inst(&format!("br label %endif{id}"));
                self.open_label(&format!("endif{id}"));
            }

            Instruction::Loop => {
                let id = self.fresh_label();
                self.inst(&format!("br label %loop_hdr{id}"));
                self.open_label(&format!("loop_hdr{id}"));
                self.ctrl.push(Ctrl::Loop {
                    id,
                    body_open: false,
                });
            }
            Instruction::CBreak => {
                let (id, first) = match self.innermost_loop_mut() {
                    Ctrl::Loop { id, body_open } => {
                        let first = !*body_open;
                        *body_open = true;
                        (*id, first)
                    }
                    Ctrl::If { .. } => unreachable!(),
                };
                // The first conditional break opens the loop body; later
                // ones (from `break`) continue in a fresh block.
                let cont = if first {
                    format!("loop_body{id}")
                } else {
                    format!("loop_cont{}", self.fresh_label())
                };
                let (cond, _) = self.pop();
                let flag = self.fresh();
                self.inst(&format!("{flag} = icmp ne i32 {cond}, 0"));
                self.inst(&format!("br i1 {flag}, label %{cont}, label %loop_end{id}"));
                self.open_label(&cont);
            }
            Instruction::Continue => {
                let id = match self.innermost_loop_mut() {
                    Ctrl::Loop { id, .. } => *id,
                    Ctrl::If { .. } => unreachable!(),
                };
                self.inst(&format!("br label %loop_hdr{id}"));
                self.terminated = true;
            }
            Instruction::EndLoop => {
                let id = match self.ctrl.pop() {
                    Some(Ctrl::Loop { id, .. }) => id,
                    _ => panic!("ENDLOOP outside LOOP"),
                };
                self.inst(&format!("br label %loop_hdr{id}"));
                self.open_label(&format!("loop_end{id}"));
            }

            Instruction::Call(target) => self.emit_call(target),
            Instruction::Ret => match func.ret {
                Some(tag) => {
                    let (value, _) = self.pop();
                    self.inst(&format!("ret {} {value}", ty(tag)));
                    self.terminated = true;
                }
                None => {
                    self.inst("ret void");
                    self.terminated = true;
                }
            },

            Instruction::PrintI => {
                let (value, _) = self.pop();
                self.inst(&format!("call void @_printi(i32 {value})"));
            }
            Instruction::PrintF => {
                let (value, _) = self.pop();
                self.inst(&format!("call void @_printf(double {value})"));
            }
        }
    }

    /// `CALL`: pop the arguments in reverse, then call.
    fn emit_call(&mut self, target: FuncRef) {
        let (name, params, ret) = match target {
            FuncRef::Import(index) => {
                let import = &self.module.imports[index as usize];
                (import.name.clone(), import.params.clone(), import.ret)
            }
            FuncRef::Func(index) => {
                let func = &self.module.funcs[index as usize];
                (
                    func.name.clone(),
                    func.params.iter().map(|(_, tag)| *tag).collect(),
                    func.ret,
                )
            }
        };

        let mut args: Vec<String> = Vec::new();
        args.resize(params.len(), String::new());
        for slot in (0..params.len()).rev() {
            let (value, _) = self.pop();
            args[slot] = format!("{} {value}", ty(params[slot]));
        }
        let arg_list = args.join(", ");

        match ret {
            Some(tag) => {
                let result = self.fresh();
                self.inst(&format!("{result} = call {} @{name}({arg_list})", ty(tag)));
                self.push(result, tag);
            }
            None => self.inst(&format!("call void @{name}({arg_list})")),
        }
    }

    /// `GROWM`: round up to pages, raise the byte count if needed, and
    /// push the new size.
    fn emit_grow(&mut self) {
        let (size, _) = self.pop();
        let rounded = self.fresh();
        self.inst(&format!("{rounded} = add i32 {size}, {}", PAGE_SIZE - 1));
        let needed = self.fresh();
        self.inst(&format!("{needed} = udiv i32 {rounded}, {PAGE_SIZE}"));
        let current_bytes = self.fresh();
        self.inst(&format!(
            "{current_bytes} = load i32, i32* @wabbit.memsize"
        ));
        let current = self.fresh();
        self.inst(&format!("{current} = udiv i32 {current_bytes}, {PAGE_SIZE}"));
        let grows = self.fresh();
        self.inst(&format!("{grows} = icmp ugt i32 {needed}, {current}"));
        let pages = self.fresh();
        self.inst(&format!(
            "{pages} = select i1 {grows}, i32 {needed}, i32 {current}"
        ));
        let bytes = self.fresh();
        self.inst(&format!("{bytes} = mul i32 {pages}, {PAGE_SIZE}"));
        self.inst(&format!("store i32 {bytes}, i32* @wabbit.memsize"));
        self.push(bytes, TypeTag::I);
    }

    /// A typed `i32*` into the memory arena at a dynamic address.
    fn mem_ptr(&mut self, addr: &str) -> String {
        let arena = self.arena_bytes;
        let raw = self.fresh();
        self.inst(&format!(
            "{raw} = getelementptr [{arena} x i8], [{arena} x i8]* @wabbit.memory, i32 0, i32 {addr}"
        ));
        let typed = self.fresh();
        self.inst(&format!("{typed} = bitcast i8* {raw} to i32*"));
        typed
    }

    /// The alloca or global backing a variable slot.
    fn slot_ptr(&self, func: &IrFunction, storage: Storage, index: u32) -> (String, TypeTag) {
        match storage {
            Storage::Local => {
                let slot = index as usize;
                let (name, tag) = func
                    .params
                    .iter()
                    .chain(&func.locals)
                    .nth(slot)
                    .expect("local slot in range");
                (slot_name(slot, name), *tag)
            }
            Storage::Global => {
                let global = &self.module.globals[index as usize];
                (global_name(&global.name), global.tag)
            }
        }
    }

    fn innermost_loop_mut(&mut self) -> &mut Ctrl {
        self.ctrl
            .iter_mut()
            .rev()
            .find(|frame| matches!(frame, Ctrl::Loop { .. }))
            .expect("loop instruction outside LOOP")
    }

    // -- Value stack --

    fn push(&mut self, value: String, tag: TypeTag) {
        self.stack.push((value, tag));
    }

    fn pop(&mut self) -> (String, TypeTag) {
        self.stack.pop().expect("emitter stack underflow")
    }

    fn binary(&mut self, op: &str, tag: TypeTag) {
        let (right, _) = self.pop();
        let (left, _) = self.pop();
        let result = self.fresh();
        self.inst(&format!("{result} = {op} {} {left}, {right}", ty(tag)));
        self.push(result, tag);
    }

    /// Comparison: an `i1` widened back to `i32`.
    fn compare(&mut self, op: &str, tag: TypeTag) {
        let (right, _) = self.pop();
        let (left, _) = self.pop();
        let flag = self.fresh();
        self.inst(&format!("{flag} = {op} {} {left}, {right}", ty(tag)));
        let result = self.fresh();
        self.inst(&format!("{result} = zext i1 {flag} to i32"));
        self.push(result, TypeTag::I);
    }

    // -- Text emission --

    fn fresh(&mut self) -> String {
        let name = format!("%t{}", self.tmp);
        self.tmp += 1;
        name
    }

    fn fresh_label(&mut self) -> u32 {
        let id = self.next_label;
        self.next_label += 1;
        id
    }

    /// Emit one instruction line, reopening a block first if the previous
    /// one was just terminated.
    fn inst(&mut self, line: &str) {
        if self.terminated {
            let id = self.fresh_label();
            self.raw(&format!("dead{id}:"));
            self.terminated = false;
        }
        self.out.push_str("  ");
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn open_label(&mut self, label: &str) {
        self.raw(&format!("{label}:"));
        self.terminated = false;
    }

    fn raw(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }
}

fn ty(tag: TypeTag) -> &'static str {
    match tag {
        TypeTag::I => "i32",
        TypeTag::F => "double",
    }
}

fn ret_ty(ret: Option<TypeTag>) -> &'static str {
    match ret {
        Some(tag) => ty(tag),
        None => "void",
    }
}

fn slot_name(slot: usize, name: &str) -> String {
    format!("%v{slot}_{name}")
}

fn global_name(name: &str) -> String {
    format!("@g.{name}")
}

/// A float literal in LLVM's exact hexadecimal form.
fn float_lit(x: f64) -> String {
    format!("0x{:016X}", x.to_bits())
}
