//! Semantic checker: name resolution and type checking.
//!
//! Checking runs in two passes over a parsed [`Program`]:
//!
//! 1. A hoisting pass collects every top-level function and import into
//!    the module scope before any body is visited, so functions may refer
//!    to each other in any order. Global `const`/`var` declarations are
//!    then processed in source order, typing each initializer as it is
//!    reached.
//! 2. A typing pass walks each function body with a fresh local scope
//!    seeded from the parameters, pushing and popping nested scopes on
//!    `{ ... }` blocks, and annotates every expression with its type.
//!
//! Top-level executable statements are gathered, in source order, into an
//! implicit entry function named `main`. A program may instead define
//! `func main() int` explicitly, in which case it must have no executable
//! top-level statements.
//!
//! The checker accumulates diagnostics: the first error inside a statement
//! aborts that declaration, but checking continues with the next top-level
//! declaration so a single run can report several errors.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::ast::{
    AssignTarget, Expr, ExprKind, FuncDecl, Item, Program, Stmt, StmtKind, Type, UnaryOp,
};
use crate::diag::{Diagnostic, DiagnosticKind, Pos};
use crate::ops::{binary_result_type, cast_result_type, unary_result_type};
use crate::typed::{
    CallTarget, ConstInit, GlobalDef, ImportSig, TypedExpr, TypedExprKind, TypedFunc, TypedProgram,
    TypedStmt, TypedStmtKind,
};

/// Name of the entry function exported to the host.
pub(crate) const ENTRY_NAME: &str = "main";

/// Check a parsed program, producing a typed program or the accumulated
/// diagnostics.
pub fn check_program(program: &Program) -> Result<TypedProgram, Vec<Diagnostic>> {
    Checker::default().run(program)
}

/// A resolved symbol. Functions and imports are indices into the checker's
/// signature tables; variables carry their storage slot directly.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Symbol {
    Const { ty: Type, storage: Storage },
    Var { ty: Type, storage: Storage },
    Func(u32),
    Import(u32),
}

/// Where a variable lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Storage {
    Global(u32),
    Local(u32),
}

/// Signature of a defined function, recorded during hoisting.
#[derive(Clone, Debug)]
struct FuncSig {
    params: Vec<Type>,
    ret: Type,
}

/// Per-function checking state: the active scope chain (innermost last),
/// the local slot table, and loop nesting depth.
struct FuncCtx {
    scopes: Vec<BTreeMap<String, Symbol>>,
    params: Vec<(String, Type)>,
    locals: Vec<(String, Type)>,
    ret: Type,
    loop_depth: u32,
}

impl FuncCtx {
    fn new(ret: Type) -> Self {
        let mut scopes = Vec::new();
        scopes.push(BTreeMap::new());
        Self {
            scopes,
            params: Vec::new(),
            locals: Vec::new(),
            ret,
            loop_depth: 0,
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(BTreeMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Allocate the next local slot. Parameters occupy the low slots.
    fn alloc_local(&mut self, name: &str, ty: Type) -> u32 {
        let slot = (self.params.len() + self.locals.len()) as u32;
        self.locals.push((String::from(name), ty));
        slot
    }

    fn current_scope_mut(&mut self) -> &mut BTreeMap<String, Symbol> {
        self.scopes.last_mut().expect("scope chain never empty")
    }

    fn declared_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map(|scope| scope.contains_key(name))
            .unwrap_or(false)
    }
}

#[derive(Default)]
struct Checker {
    imports: Vec<ImportSig>,
    sigs: Vec<FuncSig>,
    globals: Vec<GlobalDef>,
    module: BTreeMap<String, Symbol>,
    diagnostics: Vec<Diagnostic>,
}

impl Checker {
    fn run(mut self, program: &Program) -> Result<TypedProgram, Vec<Diagnostic>> {
        self.hoist_functions(program);

        // Ordered top-level walk: global declarations and the implicit
        // entry body, in source order.
        let mut entry_ctx = FuncCtx::new(Type::Int);
        let mut entry_body: Vec<TypedStmt> = Vec::new();
        for item in &program.items {
            let stmt = match item {
                Item::Stmt(stmt) => stmt,
                _ => continue,
            };
            match &stmt.kind {
                StmtKind::ConstDecl { name, ty, value } => {
                    if let Err(diag) = self.declare_global(
                        &mut entry_ctx,
                        &mut entry_body,
                        stmt.pos,
                        name,
                        *ty,
                        Some(value),
                        false,
                    ) {
                        self.diagnostics.push(diag);
                    }
                }
                StmtKind::VarDecl { name, ty, value } => {
                    if let Err(diag) = self.declare_global(
                        &mut entry_ctx,
                        &mut entry_body,
                        stmt.pos,
                        name,
                        *ty,
                        value.as_ref(),
                        true,
                    ) {
                        self.diagnostics.push(diag);
                    }
                }
                _ => match self.check_stmt(&mut entry_ctx, stmt) {
                    Ok(Some(typed)) => entry_body.push(typed),
                    Ok(None) => {}
                    Err(diag) => self.diagnostics.push(diag),
                },
            }
        }

        // Function bodies, now that every global is in scope.
        let mut funcs: Vec<TypedFunc> = Vec::new();
        for item in &program.items {
            if let Item::Func(decl) = item {
                let func = self.check_func(decl);
                funcs.push(func);
            }
        }

        let entry = self.resolve_entry(program, &mut funcs, entry_ctx, entry_body);

        log::debug!(
            "checked program: {} imports, {} globals, {} functions, {} diagnostics",
            self.imports.len(),
            self.globals.len(),
            funcs.len(),
            self.diagnostics.len()
        );

        if self.diagnostics.is_empty() {
            Ok(TypedProgram {
                imports: self.imports,
                globals: self.globals,
                funcs,
                entry,
            })
        } else {
            Err(self.diagnostics)
        }
    }

    /// Hoisting pass: functions and imports enter the module scope before
    /// any body or initializer is visited.
    fn hoist_functions(&mut self, program: &Program) {
        for item in &program.items {
            match item {
                Item::Func(decl) => {
                    if self.module.contains_key(&decl.name) {
                        self.duplicate(decl.pos, &decl.name);
                        continue;
                    }
                    let index = self.sigs.len() as u32;
                    self.sigs.push(FuncSig {
                        params: decl.params.iter().map(|p| p.ty).collect(),
                        ret: decl.ret,
                    });
                    self.module.insert(decl.name.clone(), Symbol::Func(index));
                }
                Item::Import(import) => {
                    if self.module.contains_key(&import.name) {
                        self.duplicate(import.pos, &import.name);
                        continue;
                    }
                    let index = self.imports.len() as u32;
                    self.imports.push(ImportSig {
                        name: import.name.clone(),
                        params: import.params.iter().map(|p| p.ty).collect(),
                        ret: import.ret,
                    });
                    self.module.insert(import.name.clone(), Symbol::Import(index));
                }
                Item::Stmt(_) => {}
            }
        }
    }

    /// Declare one module-level `const`/`var`. Literal initializers become
    /// the global's init value; anything else is lowered as a store in the
    /// entry body at this source position.
    #[allow(clippy::too_many_arguments)]
    fn declare_global(
        &mut self,
        entry_ctx: &mut FuncCtx,
        entry_body: &mut Vec<TypedStmt>,
        pos: Pos,
        name: &str,
        annotation: Option<Type>,
        value: Option<&Expr>,
        mutable: bool,
    ) -> Result<(), Diagnostic> {
        if self.module.contains_key(name) {
            return Err(self.duplicate_diag(pos, name));
        }

        let typed_value = match value {
            Some(expr) => Some(self.check_expr(entry_ctx, expr)?),
            None => None,
        };
        let ty = self.declaration_type(pos, name, annotation, typed_value.as_ref())?;

        let index = self.globals.len() as u32;
        let init = typed_value.as_ref().and_then(literal_init);
        self.globals.push(GlobalDef {
            name: String::from(name),
            ty,
            init,
        });
        let storage = Storage::Global(index);
        let symbol = if mutable {
            Symbol::Var { ty, storage }
        } else {
            Symbol::Const { ty, storage }
        };
        self.module.insert(String::from(name), symbol);

        if let Some(value) = typed_value {
            if init.is_none() {
                entry_body.push(TypedStmt {
                    kind: TypedStmtKind::StoreGlobal { index, value },
                    pos,
                });
            }
        }
        Ok(())
    }

    /// Resolve the declared type of a `const`/`var` against its initializer.
    fn declaration_type(
        &mut self,
        pos: Pos,
        name: &str,
        annotation: Option<Type>,
        value: Option<&TypedExpr>,
    ) -> Result<Type, Diagnostic> {
        if let Some(value) = value {
            if value.ty == Type::Void {
                return Err(Diagnostic::new(
                    pos,
                    DiagnosticKind::Type,
                    format!("initializer of '{name}' has type void"),
                ));
            }
        }
        match (annotation, value) {
            (Some(ty), Some(value)) if value.ty != ty => Err(Diagnostic::new(
                pos,
                DiagnosticKind::Type,
                format!("'{name}' is declared {ty} but initialized with {}", value.ty),
            )),
            (Some(ty), _) => Ok(ty),
            (None, Some(value)) => Ok(value.ty),
            (None, None) => Err(Diagnostic::new(
                pos,
                DiagnosticKind::Type,
                format!("'{name}' needs a type annotation or an initializer"),
            )),
        }
    }

    /// Check one function body.
    fn check_func(&mut self, decl: &FuncDecl) -> TypedFunc {
        let mut ctx = FuncCtx::new(decl.ret);
        for param in &decl.params {
            if ctx.declared_in_current_scope(&param.name) {
                self.duplicate(param.pos, &param.name);
                continue;
            }
            let slot = ctx.params.len() as u32;
            ctx.params.push((param.name.clone(), param.ty));
            ctx.current_scope_mut().insert(
                param.name.clone(),
                Symbol::Var {
                    ty: param.ty,
                    storage: Storage::Local(slot),
                },
            );
        }

        let mut body = Vec::new();
        let mut failed = false;
        for stmt in &decl.body {
            match self.check_stmt(&mut ctx, stmt) {
                Ok(Some(typed)) => body.push(typed),
                Ok(None) => {}
                Err(diag) => {
                    self.diagnostics.push(diag);
                    failed = true;
                    break;
                }
            }
        }

        if !failed && decl.ret != Type::Void && !contains_return(&decl.body) {
            self.diagnostics.push(Diagnostic::new(
                decl.pos,
                DiagnosticKind::Return,
                format!("function '{}' returns {} but has no return", decl.name, decl.ret),
            ));
        }

        TypedFunc {
            name: decl.name.clone(),
            params: ctx.params,
            ret: decl.ret,
            locals: ctx.locals,
            body,
        }
    }

    /// Pick the entry function: an explicit `func main() int`, or a
    /// function synthesized from the top-level statements.
    fn resolve_entry(
        &mut self,
        program: &Program,
        funcs: &mut Vec<TypedFunc>,
        entry_ctx: FuncCtx,
        entry_body: Vec<TypedStmt>,
    ) -> u32 {
        if let Some(Symbol::Func(index)) = self.module.get(ENTRY_NAME).copied() {
            let decl_pos = program
                .items
                .iter()
                .find_map(|item| match item {
                    Item::Func(decl) if decl.name == ENTRY_NAME => Some(decl.pos),
                    _ => None,
                })
                .unwrap_or(Pos::new(1, 1));
            if !entry_body.is_empty() {
                self.diagnostics.push(Diagnostic::new(
                    decl_pos,
                    DiagnosticKind::Name,
                    "explicit 'main' conflicts with top-level statements",
                ));
            }
            let sig = &self.sigs[index as usize];
            if !sig.params.is_empty() || sig.ret != Type::Int {
                self.diagnostics.push(Diagnostic::new(
                    decl_pos,
                    DiagnosticKind::Type,
                    "entry function must be declared 'func main() int'",
                ));
            }
            return index;
        }

        funcs.push(TypedFunc {
            name: String::from(ENTRY_NAME),
            params: Vec::new(),
            ret: Type::Int,
            locals: entry_ctx.locals,
            body: entry_body,
        });
        (funcs.len() - 1) as u32
    }

    // -- Statements --

    /// Check one statement. `Ok(None)` means the statement has no runtime
    /// effect (a `var` declaration without initializer).
    fn check_stmt(&mut self, ctx: &mut FuncCtx, stmt: &Stmt) -> Result<Option<TypedStmt>, Diagnostic> {
        let pos = stmt.pos;
        let kind = match &stmt.kind {
            StmtKind::Print(expr) => {
                let value = self.check_expr(ctx, expr)?;
                if value.ty == Type::Void {
                    return Err(Diagnostic::new(
                        expr.pos,
                        DiagnosticKind::Type,
                        "cannot print a void value",
                    ));
                }
                TypedStmtKind::Print(value)
            }

            StmtKind::Assign { target, value } => match target {
                AssignTarget::Name(name) => {
                    let symbol = self.lookup(ctx, name).ok_or_else(|| self.undefined(pos, name))?;
                    let (ty, storage) = match symbol {
                        Symbol::Var { ty, storage } => (ty, storage),
                        Symbol::Const { .. } => {
                            return Err(Diagnostic::new(
                                pos,
                                DiagnosticKind::Name,
                                format!("cannot assign to const '{name}'"),
                            ));
                        }
                        Symbol::Func(_) | Symbol::Import(_) => {
                            return Err(Diagnostic::new(
                                pos,
                                DiagnosticKind::Name,
                                format!("cannot assign to function '{name}'"),
                            ));
                        }
                    };
                    let value = self.check_expr(ctx, value)?;
                    if value.ty != ty {
                        return Err(Diagnostic::new(
                            pos,
                            DiagnosticKind::Type,
                            format!("cannot assign {} to {ty} variable '{name}'", value.ty),
                        ));
                    }
                    store_stmt(storage, value)
                }
                AssignTarget::Mem(addr) => {
                    let addr = self.int_operand(ctx, addr, "memory address")?;
                    let value = self.check_expr(ctx, value)?;
                    if value.ty != Type::Int {
                        return Err(Diagnostic::new(
                            pos,
                            DiagnosticKind::Type,
                            format!("memory stores int values, got {}", value.ty),
                        ));
                    }
                    TypedStmtKind::MemStore { addr, value }
                }
            },

            StmtKind::ConstDecl { name, ty, value } => {
                let value = self.check_expr(ctx, value)?;
                return self.declare_local(ctx, pos, name, *ty, Some(value), false);
            }

            StmtKind::VarDecl { name, ty, value } => {
                let value = match value {
                    Some(expr) => Some(self.check_expr(ctx, expr)?),
                    None => None,
                };
                return self.declare_local(ctx, pos, name, *ty, value, true);
            }

            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.bool_condition(ctx, cond, "if")?;
                let then_body = self.check_block(ctx, then_body)?;
                let else_body = self.check_block(ctx, else_body)?;
                TypedStmtKind::If {
                    cond,
                    then_body,
                    else_body,
                }
            }

            StmtKind::While { cond, body } => {
                let cond = self.bool_condition(ctx, cond, "while")?;
                ctx.loop_depth += 1;
                let body = self.check_block(ctx, body);
                ctx.loop_depth -= 1;
                TypedStmtKind::While { cond, body: body? }
            }

            StmtKind::Break => {
                if ctx.loop_depth == 0 {
                    return Err(Diagnostic::new(
                        pos,
                        DiagnosticKind::Type,
                        "break used outside of a while loop",
                    ));
                }
                TypedStmtKind::Break
            }

            StmtKind::Continue => {
                if ctx.loop_depth == 0 {
                    return Err(Diagnostic::new(
                        pos,
                        DiagnosticKind::Type,
                        "continue used outside of a while loop",
                    ));
                }
                TypedStmtKind::Continue
            }

            StmtKind::Return(value) => match value {
                Some(expr) => {
                    let value = self.check_expr(ctx, expr)?;
                    if ctx.ret == Type::Void {
                        return Err(Diagnostic::new(
                            pos,
                            DiagnosticKind::Return,
                            "void function cannot return a value",
                        ));
                    }
                    if value.ty != ctx.ret {
                        return Err(Diagnostic::new(
                            pos,
                            DiagnosticKind::Return,
                            format!("function returns {}, got {}", ctx.ret, value.ty),
                        ));
                    }
                    TypedStmtKind::Return(Some(value))
                }
                None => {
                    if ctx.ret != Type::Void {
                        return Err(Diagnostic::new(
                            pos,
                            DiagnosticKind::Return,
                            format!("return value of type {} expected", ctx.ret),
                        ));
                    }
                    TypedStmtKind::Return(None)
                }
            },

            StmtKind::Expr(expr) => {
                let value = self.check_expr(ctx, expr)?;
                if value.ty != Type::Void {
                    return Err(Diagnostic::new(
                        expr.pos,
                        DiagnosticKind::Type,
                        format!("expression statement must have type void, got {}", value.ty),
                    ));
                }
                TypedStmtKind::Expr(value)
            }
        };
        Ok(Some(TypedStmt { kind, pos }))
    }

    /// Declare a local `const`/`var` in the current scope and emit the
    /// initializing store, if any.
    fn declare_local(
        &mut self,
        ctx: &mut FuncCtx,
        pos: Pos,
        name: &str,
        annotation: Option<Type>,
        value: Option<TypedExpr>,
        mutable: bool,
    ) -> Result<Option<TypedStmt>, Diagnostic> {
        if ctx.declared_in_current_scope(name) {
            return Err(self.duplicate_diag(pos, name));
        }
        let ty = self.declaration_type(pos, name, annotation, value.as_ref())?;
        let slot = ctx.alloc_local(name, ty);
        let storage = Storage::Local(slot);
        let symbol = if mutable {
            Symbol::Var { ty, storage }
        } else {
            Symbol::Const { ty, storage }
        };
        ctx.current_scope_mut().insert(String::from(name), symbol);
        Ok(value.map(|value| TypedStmt {
            kind: TypedStmtKind::StoreLocal { slot, value },
            pos,
        }))
    }

    /// Check a `{ ... }` block in a fresh nested scope.
    fn check_block(&mut self, ctx: &mut FuncCtx, body: &[Stmt]) -> Result<Vec<TypedStmt>, Diagnostic> {
        ctx.push_scope();
        let mut out = Vec::new();
        for stmt in body {
            match self.check_stmt(ctx, stmt) {
                Ok(Some(typed)) => out.push(typed),
                Ok(None) => {}
                Err(diag) => {
                    ctx.pop_scope();
                    return Err(diag);
                }
            }
        }
        ctx.pop_scope();
        Ok(out)
    }

    fn bool_condition(
        &mut self,
        ctx: &mut FuncCtx,
        cond: &Expr,
        construct: &str,
    ) -> Result<TypedExpr, Diagnostic> {
        let cond_pos = cond.pos;
        let cond = self.check_expr(ctx, cond)?;
        if cond.ty != Type::Bool {
            return Err(Diagnostic::new(
                cond_pos,
                DiagnosticKind::Type,
                format!("{construct} test must be bool, got {}", cond.ty),
            ));
        }
        Ok(cond)
    }

    // -- Expressions --

    fn check_expr(&mut self, ctx: &mut FuncCtx, expr: &Expr) -> Result<TypedExpr, Diagnostic> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Int(value) => Ok(TypedExpr::new(TypedExprKind::Int(*value), Type::Int)),
            ExprKind::Float(value) => Ok(TypedExpr::new(TypedExprKind::Float(*value), Type::Float)),
            ExprKind::Bool(value) => Ok(TypedExpr::new(TypedExprKind::Bool(*value), Type::Bool)),

            ExprKind::Name(name) => {
                let symbol = self.lookup(ctx, name).ok_or_else(|| self.undefined(pos, name))?;
                match symbol {
                    Symbol::Const { ty, storage } | Symbol::Var { ty, storage } => {
                        Ok(TypedExpr::new(load_expr(storage), ty))
                    }
                    Symbol::Func(_) | Symbol::Import(_) => Err(Diagnostic::new(
                        pos,
                        DiagnosticKind::Type,
                        format!("'{name}' is a function, not a variable"),
                    )),
                }
            }

            ExprKind::Infix { op, left, right } => {
                let left = self.check_expr(ctx, left)?;
                let right = self.check_expr(ctx, right)?;
                let ty = binary_result_type(*op, left.ty, right.ty).ok_or_else(|| {
                    Diagnostic::new(
                        pos,
                        DiagnosticKind::Type,
                        format!(
                            "unsupported operand types for {}: {} and {}",
                            op.symbol(),
                            left.ty,
                            right.ty
                        ),
                    )
                })?;
                Ok(TypedExpr::new(
                    TypedExprKind::Infix {
                        op: *op,
                        left: left.into(),
                        right: right.into(),
                    },
                    ty,
                ))
            }

            ExprKind::Prefix { op, operand } => {
                let operand = self.check_expr(ctx, operand)?;
                let ty = unary_result_type(*op, operand.ty).ok_or_else(|| {
                    Diagnostic::new(
                        pos,
                        DiagnosticKind::Type,
                        format!(
                            "unsupported operand type for unary {}: {}",
                            op.symbol(),
                            operand.ty
                        ),
                    )
                })?;
                Ok(TypedExpr::new(
                    TypedExprKind::Prefix {
                        op: *op,
                        operand: operand.into(),
                    },
                    ty,
                ))
            }

            ExprKind::Call { name, args } => self.check_call(ctx, pos, name, args),

            ExprKind::Cast { to, value } => {
                let value = self.check_expr(ctx, value)?;
                let ty = cast_result_type(value.ty, *to).ok_or_else(|| {
                    Diagnostic::new(
                        pos,
                        DiagnosticKind::Type,
                        format!("cannot cast {} to {to}", value.ty),
                    )
                })?;
                Ok(TypedExpr::new(
                    TypedExprKind::Cast {
                        to: *to,
                        value: value.into(),
                    },
                    ty,
                ))
            }

            ExprKind::MemLoad(addr) => {
                let addr = self.int_operand(ctx, addr, "memory address")?;
                Ok(TypedExpr::new(TypedExprKind::MemLoad(addr.into()), Type::Int))
            }

            ExprKind::MemGrow(size) => {
                let size = self.int_operand(ctx, size, "memory size")?;
                Ok(TypedExpr::new(TypedExprKind::MemGrow(size.into()), Type::Int))
            }
        }
    }

    fn check_call(
        &mut self,
        ctx: &mut FuncCtx,
        pos: Pos,
        name: &str,
        args: &[Expr],
    ) -> Result<TypedExpr, Diagnostic> {
        let symbol = self.lookup(ctx, name).ok_or_else(|| self.undefined(pos, name))?;
        let (target, params, ret) = match symbol {
            Symbol::Func(index) => {
                let sig = &self.sigs[index as usize];
                (CallTarget::Func(index), sig.params.clone(), sig.ret)
            }
            Symbol::Import(index) => {
                let sig = &self.imports[index as usize];
                (CallTarget::Import(index), sig.params.clone(), sig.ret)
            }
            Symbol::Const { .. } | Symbol::Var { .. } => {
                return Err(Diagnostic::new(
                    pos,
                    DiagnosticKind::Type,
                    format!("'{name}' is not a function"),
                ));
            }
        };

        if args.len() != params.len() {
            return Err(Diagnostic::new(
                pos,
                DiagnosticKind::Type,
                format!("{name}() takes {} arguments, got {}", params.len(), args.len()),
            ));
        }

        let mut typed_args = Vec::with_capacity(args.len());
        for (index, (arg, param)) in args.iter().zip(&params).enumerate() {
            let arg_pos = arg.pos;
            let arg = self.check_expr(ctx, arg)?;
            if arg.ty != *param {
                return Err(Diagnostic::new(
                    arg_pos,
                    DiagnosticKind::Type,
                    format!(
                        "argument {} to {name}(): expected {param}, got {}",
                        index + 1,
                        arg.ty
                    ),
                ));
            }
            typed_args.push(arg);
        }

        Ok(TypedExpr::new(
            TypedExprKind::Call {
                target,
                args: typed_args,
            },
            ret,
        ))
    }

    /// Check an expression required to be `int` (memory operands).
    fn int_operand(
        &mut self,
        ctx: &mut FuncCtx,
        expr: &Expr,
        what: &str,
    ) -> Result<TypedExpr, Diagnostic> {
        let pos = expr.pos;
        let value = self.check_expr(ctx, expr)?;
        if value.ty != Type::Int {
            return Err(Diagnostic::new(
                pos,
                DiagnosticKind::Type,
                format!("{what} must be int, got {}", value.ty),
            ));
        }
        Ok(value)
    }

    // -- Name lookup and diagnostics --

    /// Walk the scope chain outward, ending at the module scope.
    fn lookup(&self, ctx: &FuncCtx, name: &str) -> Option<Symbol> {
        for scope in ctx.scopes.iter().rev() {
            if let Some(symbol) = scope.get(name) {
                return Some(*symbol);
            }
        }
        self.module.get(name).copied()
    }

    fn undefined(&self, pos: Pos, name: &str) -> Diagnostic {
        Diagnostic::new(pos, DiagnosticKind::Name, format!("undefined name '{name}'"))
    }

    fn duplicate_diag(&self, pos: Pos, name: &str) -> Diagnostic {
        Diagnostic::new(
            pos,
            DiagnosticKind::Name,
            format!("duplicate definition of '{name}'"),
        )
    }

    fn duplicate(&mut self, pos: Pos, name: &str) {
        let diag = self.duplicate_diag(pos, name);
        self.diagnostics.push(diag);
    }
}

fn store_stmt(storage: Storage, value: TypedExpr) -> TypedStmtKind {
    match storage {
        Storage::Local(slot) => TypedStmtKind::StoreLocal { slot, value },
        Storage::Global(index) => TypedStmtKind::StoreGlobal { index, value },
    }
}

fn load_expr(storage: Storage) -> TypedExprKind {
    match storage {
        Storage::Local(slot) => TypedExprKind::LoadLocal(slot),
        Storage::Global(index) => TypedExprKind::LoadGlobal(index),
    }
}

/// Extract a literal global initializer, folding a leading unary sign.
fn literal_init(value: &TypedExpr) -> Option<ConstInit> {
    match &value.kind {
        TypedExprKind::Int(n) => Some(ConstInit::Int(*n)),
        TypedExprKind::Float(x) => Some(ConstInit::Float(*x)),
        TypedExprKind::Bool(b) => Some(ConstInit::Bool(*b)),
        TypedExprKind::Prefix { op, operand } => match (op, &operand.kind) {
            (UnaryOp::Neg, TypedExprKind::Int(n)) => Some(ConstInit::Int(n.wrapping_neg())),
            (UnaryOp::Neg, TypedExprKind::Float(x)) => Some(ConstInit::Float(-x)),
            (UnaryOp::Plus, TypedExprKind::Int(n)) => Some(ConstInit::Int(*n)),
            (UnaryOp::Plus, TypedExprKind::Float(x)) => Some(ConstInit::Float(*x)),
            _ => None,
        },
        _ => None,
    }
}

/// Whether a statement list contains a `return` anywhere. Used for the
/// conservative missing-return check; no reachability analysis.
fn contains_return(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::If {
            then_body,
            else_body,
            ..
        } => contains_return(then_body) || contains_return(else_body),
        StmtKind::While { body, .. } => contains_return(body),
        _ => false,
    })
}
