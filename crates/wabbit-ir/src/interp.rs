//! IR interpreter: an abstract machine over a value stack and frames.
//!
//! The machine owns a call-frame stack (each frame has its own operand
//! stack and locals), the module globals, one linear byte array for
//! `PEEKI`/`POKEI`/`GROWM`, and an output buffer that collects one line
//! per executed print.
//!
//! Structured control flow is resolved once at load time: a scan over
//! each function's code pairs every `IF` with its `ELSE`/`ENDIF` and
//! every `CBREAK`/`CONTINUE`/`ENDLOOP` with its `LOOP`, so dispatch is a
//! plain table lookup. Unbalanced control markers are a generator bug and
//! abort resolution.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::instr::{FuncRef, Instruction, IrConst, IrFunction, IrModule, Storage, TypeTag, PAGE_SIZE};

/// Default maximum call depth.
const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// A runtime value on the operand stack.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    I(i64),
    F(f64),
}

impl Value {
    /// The zero value for a type tag.
    pub fn zero(tag: TypeTag) -> Self {
        match tag {
            TypeTag::I => Self::I(0),
            TypeTag::F => Self::F(0.0),
        }
    }

    fn as_i(self) -> Result<i64, VmError> {
        match self {
            Self::I(n) => Ok(n),
            Self::F(_) => Err(VmError::type_mismatch("expected an integer value")),
        }
    }

    fn as_f(self) -> Result<f64, VmError> {
        match self {
            Self::F(x) => Ok(x),
            Self::I(_) => Err(VmError::type_mismatch("expected a float value")),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I(n) => write!(f, "{n}"),
            Self::F(x) => write!(f, "{x}"),
        }
    }
}

/// Stable interpreter error categories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VmErrorKind {
    /// Pop on an empty operand stack; indicates a generator bug.
    StackUnderflow,
    /// Operand type does not match the instruction; indicates a checker bug.
    TypeMismatch,
    /// Integer division by zero.
    DivisionByZero,
    /// Memory access outside the linear memory.
    MemoryOutOfBounds,
    /// Call depth exceeded the configured limit.
    CallDepthExceeded,
    /// Call to an imported function; the interpreter has no host bindings.
    UnresolvedImport(String),
    /// Unexpected internal machine state.
    InternalError,
}

/// Interpreter error payload.
#[derive(Clone, Debug, PartialEq)]
pub struct VmError {
    pub kind: VmErrorKind,
    pub message: String,
}

impl VmError {
    fn new(kind: VmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn stack_underflow() -> Self {
        Self::new(VmErrorKind::StackUnderflow, "operand stack underflow")
    }

    fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(VmErrorKind::TypeMismatch, message)
    }

    fn division_by_zero() -> Self {
        Self::new(VmErrorKind::DivisionByZero, "division by zero")
    }

    fn memory_out_of_bounds(addr: i64, len: usize) -> Self {
        Self::new(
            VmErrorKind::MemoryOutOfBounds,
            format!("memory access at {addr} outside {len} bytes"),
        )
    }

    fn unresolved_import(name: &str) -> Self {
        Self::new(
            VmErrorKind::UnresolvedImport(String::from(name)),
            format!("cannot interpret call to imported function '{name}'"),
        )
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(VmErrorKind::InternalError, message)
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One call frame: program counter, locals, and a private operand stack.
struct Frame {
    func: u32,
    pc: usize,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl Frame {
    fn new(module: &IrModule, func: u32, args: Vec<Value>) -> Self {
        let decl = &module.funcs[func as usize];
        let mut locals = args;
        locals.extend(decl.locals.iter().map(|(_, tag)| Value::zero(*tag)));
        Self {
            func,
            pc: 0,
            locals,
            stack: Vec::new(),
        }
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or_else(VmError::stack_underflow)
    }
}

/// The IR interpreter.
pub struct Machine<'a> {
    module: &'a IrModule,
    /// Per-function jump tables for structured control, indexed by the
    /// position of the transferring instruction.
    jumps: Vec<BTreeMap<usize, usize>>,
    frames: Vec<Frame>,
    globals: Vec<Value>,
    memory: Vec<u8>,
    output: Vec<String>,
    max_call_depth: usize,
}

impl<'a> Machine<'a> {
    /// Create a machine for a module with default limits.
    pub fn new(module: &'a IrModule) -> Self {
        let jumps = module.funcs.iter().map(resolve_control).collect();
        let globals = module
            .globals
            .iter()
            .map(|global| match global.init {
                Some(IrConst::I(n)) => Value::I(n),
                Some(IrConst::F(x)) => Value::F(x),
                None => Value::zero(global.tag),
            })
            .collect();
        let memory = if module.uses_memory {
            let mut memory = Vec::new();
            memory.resize(PAGE_SIZE as usize, 0);
            memory
        } else {
            Vec::new()
        };
        Self {
            module,
            jumps,
            frames: Vec::new(),
            globals,
            memory,
            output: Vec::new(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Override the call depth limit.
    pub fn with_call_depth_limit(mut self, limit: usize) -> Self {
        self.max_call_depth = limit;
        self
    }

    /// Print lines produced so far, one value per line.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Consume the machine, keeping its output.
    pub fn into_output(self) -> Vec<String> {
        self.output
    }

    /// Run the module's entry function to completion and return its value.
    pub fn run(&mut self) -> Result<Value, VmError> {
        self.frames.push(Frame::new(self.module, self.module.entry, Vec::new()));
        let result = self.dispatch();
        log::debug!(
            "interpreter finished: {} output lines, result {:?}",
            self.output.len(),
            result
        );
        result
    }

    fn dispatch(&mut self) -> Result<Value, VmError> {
        loop {
            let frame = self
                .frames
                .last()
                .ok_or_else(|| VmError::internal("no active frame"))?;
            let func = &self.module.funcs[frame.func as usize];
            let instruction = *func
                .code
                .get(frame.pc)
                .ok_or_else(|| VmError::internal("program counter past end of code"))?;
            let at = frame.pc;
            self.top_mut().pc = at + 1;

            match instruction {
                Instruction::ConstI(n) => self.top_mut().push(Value::I(n)),
                Instruction::ConstF(x) => self.top_mut().push(Value::F(x)),

                Instruction::AddI => self.binary_i(|a, b| Ok(a.wrapping_add(b)))?,
                Instruction::SubI => self.binary_i(|a, b| Ok(a.wrapping_sub(b)))?,
                Instruction::MulI => self.binary_i(|a, b| Ok(a.wrapping_mul(b)))?,
                Instruction::DivI => self.binary_i(|a, b| {
                    if b == 0 {
                        Err(VmError::division_by_zero())
                    } else {
                        Ok(a.wrapping_div(b))
                    }
                })?,

                Instruction::AddF => self.binary_f(|a, b| a + b)?,
                Instruction::SubF => self.binary_f(|a, b| a - b)?,
                Instruction::MulF => self.binary_f(|a, b| a * b)?,
                Instruction::DivF => self.binary_f(|a, b| a / b)?,

                Instruction::LtI => self.compare_i(|a, b| a < b)?,
                Instruction::LeI => self.compare_i(|a, b| a <= b)?,
                Instruction::GtI => self.compare_i(|a, b| a > b)?,
                Instruction::GeI => self.compare_i(|a, b| a >= b)?,
                Instruction::EqI => self.compare_i(|a, b| a == b)?,
                Instruction::NeI => self.compare_i(|a, b| a != b)?,

                Instruction::LtF => self.compare_f(|a, b| a < b)?,
                Instruction::LeF => self.compare_f(|a, b| a <= b)?,
                Instruction::GtF => self.compare_f(|a, b| a > b)?,
                Instruction::GeF => self.compare_f(|a, b| a >= b)?,
                Instruction::EqF => self.compare_f(|a, b| a == b)?,
                Instruction::NeF => self.compare_f(|a, b| a != b)?,

                Instruction::AndI => self.binary_i(|a, b| Ok(a & b))?,
                Instruction::OrI => self.binary_i(|a, b| Ok(a | b))?,
                Instruction::XorI => self.binary_i(|a, b| Ok(a ^ b))?,

                Instruction::Itof => {
                    let n = self.top_mut().pop()?.as_i()?;
                    self.top_mut().push(Value::F(n as f64));
                }
                Instruction::Ftoi => {
                    let x = self.top_mut().pop()?.as_f()?;
                    self.top_mut().push(Value::I(x as i64));
                }

                Instruction::PeekI => {
                    let addr = self.top_mut().pop()?.as_i()?;
                    let value = self.mem_read(addr)?;
                    self.top_mut().push(Value::I(value));
                }
                Instruction::PokeI => {
                    let value = self.top_mut().pop()?.as_i()?;
                    let addr = self.top_mut().pop()?.as_i()?;
                    self.mem_write(addr, value)?;
                }
                Instruction::GrowM => {
                    let size = self.top_mut().pop()?.as_i()?;
                    let new_size = self.mem_grow(size);
                    self.top_mut().push(Value::I(new_size));
                }

                Instruction::Load(slot) => {
                    let value = match slot.storage {
                        Storage::Local => self.top_ref().locals[slot.index as usize],
                        Storage::Global => self.globals[slot.index as usize],
                    };
                    self.top_mut().push(value);
                }
                Instruction::Store(slot) => {
                    let value = self.top_mut().pop()?;
                    match slot.storage {
                        Storage::Local => self.top_mut().locals[slot.index as usize] = value,
                        Storage::Global => self.globals[slot.index as usize] = value,
                    }
                }

                Instruction::If => {
                    let cond = self.top_mut().pop()?.as_i()?;
                    if cond == 0 {
                        self.jump(at)?;
                    }
                }
                Instruction::Else => self.jump(at)?,
                Instruction::EndIf => {}
                Instruction::Loop => {}
                Instruction::CBreak => {
                    let cond = self.top_mut().pop()?.as_i()?;
                    if cond == 0 {
                        self.jump(at)?;
                    }
                }
                Instruction::Continue => self.jump(at)?,
                Instruction::EndLoop => self.jump(at)?,

                Instruction::Call(target) => self.call(target)?,

                Instruction::Ret => {
                    let ret = self.module.funcs[self.top_ref().func as usize].ret;
                    let value = match ret {
                        Some(_) => Some(self.top_mut().pop()?),
                        None => None,
                    };
                    self.frames.pop();
                    match self.frames.last_mut() {
                        Some(caller) => {
                            if let Some(value) = value {
                                caller.push(value);
                            }
                        }
                        None => return Ok(value.unwrap_or(Value::I(0))),
                    }
                }

                Instruction::PrintI => {
                    let n = self.top_mut().pop()?.as_i()?;
                    self.output.push(format!("{n}"));
                }
                Instruction::PrintF => {
                    let x = self.top_mut().pop()?.as_f()?;
                    self.output.push(format!("{x}"));
                }
            }
        }
    }

    // -- Frame helpers --

    fn top_ref(&self) -> &Frame {
        self.frames.last().expect("active frame")
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("active frame")
    }

    /// Transfer control according to the jump table entry for `at`.
    fn jump(&mut self, at: usize) -> Result<(), VmError> {
        let func = self.top_ref().func as usize;
        let target = *self.jumps[func]
            .get(&at)
            .ok_or_else(|| VmError::internal("missing jump target"))?;
        self.top_mut().pc = target;
        Ok(())
    }

    fn call(&mut self, target: FuncRef) -> Result<(), VmError> {
        let index = match target {
            FuncRef::Import(index) => {
                let name = &self.module.imports[index as usize].name;
                return Err(VmError::unresolved_import(name));
            }
            FuncRef::Func(index) => index,
        };
        if self.frames.len() >= self.max_call_depth {
            return Err(VmError::new(
                VmErrorKind::CallDepthExceeded,
                format!("call depth exceeded {} frames", self.max_call_depth),
            ));
        }
        let argc = self.module.funcs[index as usize].params.len();
        let mut args = Vec::new();
        args.resize(argc, Value::I(0));
        for slot in (0..argc).rev() {
            args[slot] = self.top_mut().pop()?;
        }
        self.frames.push(Frame::new(self.module, index, args));
        Ok(())
    }

    // -- Operand helpers --

    fn binary_i(&mut self, op: impl Fn(i64, i64) -> Result<i64, VmError>) -> Result<(), VmError> {
        let right = self.top_mut().pop()?.as_i()?;
        let left = self.top_mut().pop()?.as_i()?;
        let result = op(left, right)?;
        self.top_mut().push(Value::I(result));
        Ok(())
    }

    fn binary_f(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), VmError> {
        let right = self.top_mut().pop()?.as_f()?;
        let left = self.top_mut().pop()?.as_f()?;
        self.top_mut().push(Value::F(op(left, right)));
        Ok(())
    }

    fn compare_i(&mut self, op: impl Fn(i64, i64) -> bool) -> Result<(), VmError> {
        let right = self.top_mut().pop()?.as_i()?;
        let left = self.top_mut().pop()?.as_i()?;
        self.top_mut().push(Value::I(op(left, right) as i64));
        Ok(())
    }

    fn compare_f(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<(), VmError> {
        let right = self.top_mut().pop()?.as_f()?;
        let left = self.top_mut().pop()?.as_f()?;
        self.top_mut().push(Value::I(op(left, right) as i64));
        Ok(())
    }

    // -- Memory --

    /// Read a 32-bit little-endian integer, sign-extended, matching the
    /// Wasm back-end's `i32.load`.
    fn mem_read(&self, addr: i64) -> Result<i64, VmError> {
        let bytes = self.mem_range(addr)?;
        let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(i64::from(value))
    }

    fn mem_write(&mut self, addr: i64, value: i64) -> Result<(), VmError> {
        let len = self.memory.len();
        let offset = self.mem_offset(addr, len)?;
        let bytes = (value as i32).to_le_bytes();
        self.memory[offset..offset + 4].copy_from_slice(&bytes);
        Ok(())
    }

    fn mem_range(&self, addr: i64) -> Result<&[u8], VmError> {
        let offset = self.mem_offset(addr, self.memory.len())?;
        Ok(&self.memory[offset..offset + 4])
    }

    fn mem_offset(&self, addr: i64, len: usize) -> Result<usize, VmError> {
        let offset = usize::try_from(addr).map_err(|_| VmError::memory_out_of_bounds(addr, len))?;
        if offset.checked_add(4).map(|end| end <= len).unwrap_or(false) {
            Ok(offset)
        } else {
            Err(VmError::memory_out_of_bounds(addr, len))
        }
    }

    /// Grow memory to at least `size` bytes, in whole pages; returns the
    /// new size in bytes. Mirrors the Wasm lowering: a request that does
    /// not exceed the current size leaves memory unchanged.
    fn mem_grow(&mut self, size: i64) -> i64 {
        let page = PAGE_SIZE as u64;
        let needed = if size <= 0 {
            0
        } else {
            (size as u64).div_ceil(page)
        };
        let current = (self.memory.len() as u64) / page;
        let pages = current.max(needed);
        self.memory.resize((pages * page) as usize, 0);
        (pages * page) as i64
    }
}

/// Pre-compute jump targets for one function's structured control flow.
///
/// The table maps the index of each transferring instruction to the index
/// execution continues at:
///
/// - `IF` (condition false) continues after its `ELSE`
/// - `ELSE` (falling out of the then-arm) continues after its `ENDIF`
/// - `CBREAK` (condition false) continues after its `ENDLOOP`
/// - `CONTINUE` and `ENDLOOP` continue at their `LOOP`
///
/// Unbalanced markers can only come from a broken generator; resolution
/// asserts rather than produce a malformed table.
fn resolve_control(func: &IrFunction) -> BTreeMap<usize, usize> {
    enum Open {
        If { at: usize, else_at: Option<usize> },
        Loop { at: usize, breaks: Vec<usize> },
    }

    let mut jumps = BTreeMap::new();
    let mut open: Vec<Open> = Vec::new();

    for (at, instruction) in func.code.iter().enumerate() {
        match instruction {
            Instruction::If => open.push(Open::If { at, else_at: None }),
            Instruction::Else => match open.last_mut() {
                Some(Open::If { else_at, .. }) if else_at.is_none() => *else_at = Some(at),
                _ => panic!("ELSE without matching IF at {at} in '{}'", func.name),
            },
            Instruction::EndIf => match open.pop() {
                Some(Open::If {
                    at: if_at,
                    else_at: Some(else_at),
                }) => {
                    jumps.insert(if_at, else_at + 1);
                    jumps.insert(else_at, at + 1);
                }
                _ => panic!("ENDIF without matching IF/ELSE at {at} in '{}'", func.name),
            },
            Instruction::Loop => open.push(Open::Loop {
                at,
                breaks: Vec::new(),
            }),
            Instruction::CBreak | Instruction::Continue => {
                let loop_at = open.iter_mut().rev().find_map(|entry| match entry {
                    Open::Loop { at: loop_at, breaks } => Some((*loop_at, breaks)),
                    Open::If { .. } => None,
                });
                let Some((loop_at, breaks)) = loop_at else {
                    panic!("loop instruction outside LOOP at {at} in '{}'", func.name);
                };
                match instruction {
                    Instruction::CBreak => breaks.push(at),
                    _ => {
                        jumps.insert(at, loop_at);
                    }
                }
            }
            Instruction::EndLoop => match open.pop() {
                Some(Open::Loop { at: loop_at, breaks }) => {
                    jumps.insert(at, loop_at);
                    for brk in breaks {
                        jumps.insert(brk, at + 1);
                    }
                }
                _ => panic!("ENDLOOP without matching LOOP at {at} in '{}'", func.name),
            },
            _ => {}
        }
    }

    assert!(
        open.is_empty(),
        "unclosed control construct in '{}'",
        func.name
    );
    jumps
}
