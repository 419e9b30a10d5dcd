//! IR generation: typed AST to stack-machine instructions.
//!
//! Lowering is a straight syntax-directed walk. Evaluation order is
//! strict left to right everywhere: a binary operation emits its left
//! operand, then its right, then the typed opcode; a call emits its
//! arguments left to right and then `CALL`.
//!
//! Every function body ends with a synthetic default return (`0` or
//! `0.0` for value-returning functions) so no execution path can fall
//! off the end, whatever the source looked like.

use alloc::vec::Vec;

use wabbit_ast::{
    BinaryOp, CallTarget, ConstInit, GlobalDef, Type, TypedExpr, TypedExprKind, TypedFunc,
    TypedProgram, TypedStmt, TypedStmtKind, UnaryOp,
};

use crate::instr::{
    FuncRef, Instruction, IrConst, IrFunction, IrGlobal, IrImport, IrModule, Slot, TypeTag,
};

/// Lower a checked program to an IR module.
pub fn lower_program(program: &TypedProgram) -> IrModule {
    let mut lowerer = Lowerer::default();

    let imports = program
        .imports
        .iter()
        .map(|sig| IrImport {
            name: sig.name.clone(),
            params: sig.params.iter().map(|ty| tag_of(*ty)).collect(),
            ret: TypeTag::of(sig.ret),
        })
        .collect();

    let globals = program.globals.iter().map(lower_global).collect();

    let funcs: Vec<IrFunction> = program.funcs.iter().map(|f| lowerer.lower_func(f)).collect();

    log::debug!(
        "lowered {} functions ({} instructions total)",
        funcs.len(),
        funcs.iter().map(|f| f.code.len()).sum::<usize>()
    );

    IrModule {
        imports,
        globals,
        funcs,
        entry: program.entry,
        uses_memory: lowerer.uses_memory,
    }
}

fn lower_global(global: &GlobalDef) -> IrGlobal {
    let init = global.init.map(|init| match init {
        ConstInit::Int(n) => IrConst::I(n),
        ConstInit::Float(x) => IrConst::F(x),
        ConstInit::Bool(b) => IrConst::I(b as i64),
    });
    IrGlobal {
        name: global.name.clone(),
        tag: tag_of(global.ty),
        init,
    }
}

/// The tag of a non-void type. Void never reaches a slot or operand
/// position in a checked program.
fn tag_of(ty: Type) -> TypeTag {
    TypeTag::of(ty).expect("void has no IR value type")
}

#[derive(Default)]
struct Lowerer {
    uses_memory: bool,
}

impl Lowerer {
    fn lower_func(&mut self, func: &TypedFunc) -> IrFunction {
        let mut code = Vec::new();
        for stmt in &func.body {
            self.emit_stmt(stmt, &mut code);
        }

        // Synthetic default return; unreachable when the source already
        // returned on every path.
        let ret = TypeTag::of(func.ret);
        match ret {
            Some(TypeTag::I) => code.push(Instruction::ConstI(0)),
            Some(TypeTag::F) => code.push(Instruction::ConstF(0.0)),
            None => {}
        }
        code.push(Instruction::Ret);

        IrFunction {
            name: func.name.clone(),
            params: func
                .params
                .iter()
                .map(|(name, ty)| (name.clone(), tag_of(*ty)))
                .collect(),
            ret,
            locals: func
                .locals
                .iter()
                .map(|(name, ty)| (name.clone(), tag_of(*ty)))
                .collect(),
            code,
        }
    }

    fn emit_stmt(&mut self, stmt: &TypedStmt, code: &mut Vec<Instruction>) {
        match &stmt.kind {
            TypedStmtKind::Print(value) => {
                self.emit_expr(value, code);
                code.push(match tag_of(value.ty) {
                    TypeTag::I => Instruction::PrintI,
                    TypeTag::F => Instruction::PrintF,
                });
            }

            TypedStmtKind::StoreLocal { slot, value } => {
                self.emit_expr(value, code);
                code.push(Instruction::Store(Slot::local(*slot)));
            }

            TypedStmtKind::StoreGlobal { index, value } => {
                self.emit_expr(value, code);
                code.push(Instruction::Store(Slot::global(*index)));
            }

            TypedStmtKind::MemStore { addr, value } => {
                self.emit_expr(addr, code);
                self.emit_expr(value, code);
                code.push(Instruction::PokeI);
                self.uses_memory = true;
            }

            TypedStmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.emit_expr(cond, code);
                code.push(Instruction::If);
                for stmt in then_body {
                    self.emit_stmt(stmt, code);
                }
                code.push(Instruction::Else);
                for stmt in else_body {
                    self.emit_stmt(stmt, code);
                }
                code.push(Instruction::EndIf);
            }

            TypedStmtKind::While { cond, body } => {
                code.push(Instruction::Loop);
                self.emit_expr(cond, code);
                code.push(Instruction::CBreak);
                for stmt in body {
                    self.emit_stmt(stmt, code);
                }
                code.push(Instruction::EndLoop);
            }

            // An unconditional break is a conditional break on a false
            // condition.
            TypedStmtKind::Break => {
                code.push(Instruction::ConstI(0));
                code.push(Instruction::CBreak);
            }

            TypedStmtKind::Continue => {
                code.push(Instruction::Continue);
            }

            TypedStmtKind::Return(value) => {
                if let Some(value) = value {
                    self.emit_expr(value, code);
                }
                code.push(Instruction::Ret);
            }

            TypedStmtKind::Expr(value) => {
                // Checked to be void: the call leaves nothing behind.
                self.emit_expr(value, code);
            }
        }
    }

    fn emit_expr(&mut self, expr: &TypedExpr, code: &mut Vec<Instruction>) {
        match &expr.kind {
            TypedExprKind::Int(n) => code.push(Instruction::ConstI(*n)),
            TypedExprKind::Float(x) => code.push(Instruction::ConstF(*x)),
            TypedExprKind::Bool(b) => code.push(Instruction::ConstI(*b as i64)),

            TypedExprKind::LoadLocal(slot) => code.push(Instruction::Load(Slot::local(*slot))),
            TypedExprKind::LoadGlobal(index) => code.push(Instruction::Load(Slot::global(*index))),

            TypedExprKind::Infix { op, left, right } => {
                self.emit_expr(left, code);
                self.emit_expr(right, code);
                code.push(binary_instr(*op, tag_of(left.ty)));
            }

            TypedExprKind::Prefix { op, operand } => match op {
                UnaryOp::Plus => self.emit_expr(operand, code),
                UnaryOp::Neg => match tag_of(operand.ty) {
                    TypeTag::I => {
                        code.push(Instruction::ConstI(0));
                        self.emit_expr(operand, code);
                        code.push(Instruction::SubI);
                    }
                    TypeTag::F => {
                        code.push(Instruction::ConstF(0.0));
                        self.emit_expr(operand, code);
                        code.push(Instruction::SubF);
                    }
                },
                UnaryOp::Not => {
                    self.emit_expr(operand, code);
                    code.push(Instruction::ConstI(1));
                    code.push(Instruction::XorI);
                }
            },

            TypedExprKind::Call { target, args } => {
                for arg in args {
                    self.emit_expr(arg, code);
                }
                code.push(Instruction::Call(match target {
                    CallTarget::Import(index) => FuncRef::Import(*index),
                    CallTarget::Func(index) => FuncRef::Func(*index),
                }));
            }

            TypedExprKind::Cast { to, value } => {
                self.emit_expr(value, code);
                match (value.ty, to) {
                    (Type::Int, Type::Float) => code.push(Instruction::Itof),
                    (Type::Float, Type::Int) => code.push(Instruction::Ftoi),
                    // Identity casts emit nothing.
                    _ => {}
                }
            }

            TypedExprKind::MemLoad(addr) => {
                self.emit_expr(addr, code);
                code.push(Instruction::PeekI);
                self.uses_memory = true;
            }

            TypedExprKind::MemGrow(size) => {
                self.emit_expr(size, code);
                code.push(Instruction::GrowM);
                self.uses_memory = true;
            }
        }
    }
}

/// The typed opcode for a binary operation on operands of the given tag.
fn binary_instr(op: BinaryOp, operand: TypeTag) -> Instruction {
    use Instruction::*;
    match (operand, op) {
        (TypeTag::I, BinaryOp::Add) => AddI,
        (TypeTag::I, BinaryOp::Sub) => SubI,
        (TypeTag::I, BinaryOp::Mul) => MulI,
        (TypeTag::I, BinaryOp::Div) => DivI,
        (TypeTag::I, BinaryOp::Lt) => LtI,
        (TypeTag::I, BinaryOp::Le) => LeI,
        (TypeTag::I, BinaryOp::Gt) => GtI,
        (TypeTag::I, BinaryOp::Ge) => GeI,
        (TypeTag::I, BinaryOp::Eq) => EqI,
        (TypeTag::I, BinaryOp::Ne) => NeI,
        (TypeTag::I, BinaryOp::And) => AndI,
        (TypeTag::I, BinaryOp::Or) => OrI,
        (TypeTag::F, BinaryOp::Add) => AddF,
        (TypeTag::F, BinaryOp::Sub) => SubF,
        (TypeTag::F, BinaryOp::Mul) => MulF,
        (TypeTag::F, BinaryOp::Div) => DivF,
        (TypeTag::F, BinaryOp::Lt) => LtF,
        (TypeTag::F, BinaryOp::Le) => LeF,
        (TypeTag::F, BinaryOp::Gt) => GtF,
        (TypeTag::F, BinaryOp::Ge) => GeF,
        (TypeTag::F, BinaryOp::Eq) => EqF,
        (TypeTag::F, BinaryOp::Ne) => NeF,
        // `&&`/`||` on floats is rejected by the checker.
        (TypeTag::F, BinaryOp::And | BinaryOp::Or) => {
            unreachable!("logical operator on float operands")
        }
    }
}
