//! AST types for the Wabbit surface syntax.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::diag::Pos;

/// A complete Wabbit program: top-level declarations and statements in
/// source order.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Program {
    /// Top-level items in source order.
    pub items: Vec<Item>,
}

/// One top-level item.
#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    /// Function definition.
    Func(FuncDecl),
    /// Imported (external) function declaration.
    Import(ImportFunc),
    /// Top-level statement, including global `const`/`var` declarations.
    Stmt(Stmt),
}

/// A function definition.
#[derive(Clone, Debug, PartialEq)]
pub struct FuncDecl {
    /// Function name.
    pub name: String,
    /// Parameters.
    pub params: Vec<Param>,
    /// Declared return type. [`Type::Void`] when the annotation is omitted.
    pub ret: Type,
    /// Function body.
    pub body: Vec<Stmt>,
    /// Position of the `func` keyword.
    pub pos: Pos,
}

/// An imported function declaration (`import func name(params) type ;`).
///
/// Imported functions are provided by the host environment and called like
/// regular functions. They must be declared with their signature before use.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportFunc {
    /// Imported function name.
    pub name: String,
    /// Parameters.
    pub params: Vec<Param>,
    /// Declared return type. [`Type::Void`] when the annotation is omitted.
    pub ret: Type,
    /// Position of the `import` keyword.
    pub pos: Pos,
}

/// A function parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: Type,
    /// Position of the parameter name.
    pub pos: Pos,
}

/// The closed set of Wabbit types.
///
/// There is no implicit numeric conversion anywhere in the language; an
/// `int` operand never silently becomes a `float`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
    /// Signed integer.
    Int,
    /// Double-precision float.
    Float,
    /// Boolean. Represented as an integer `{0, 1}` below the AST level.
    Bool,
    /// Absence of a value; the return type of functions declared without
    /// a return annotation.
    Void,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Void => "void",
        };
        f.write_str(name)
    }
}

/// A statement with its source position.
#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

impl Stmt {
    /// Create a statement node.
    pub fn new(kind: StmtKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

/// Statement variants.
#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    /// `print expr ;`
    Print(Expr),
    /// `target = expr ;`
    Assign { target: AssignTarget, value: Expr },
    /// `const name [type] = expr ;`. The type is inferred from the
    /// initializer when the annotation is omitted.
    ConstDecl {
        name: String,
        ty: Option<Type>,
        value: Expr,
    },
    /// `var name type [= expr] ;` or `var name = expr ;`. At least one of
    /// the annotation and the initializer must be present.
    VarDecl {
        name: String,
        ty: Option<Type>,
        value: Option<Expr>,
    },
    /// `if expr { ... } [else { ... }]`
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    /// `while expr { ... }`
    While { cond: Expr, body: Vec<Stmt> },
    /// `break ;`
    Break,
    /// `continue ;`
    Continue,
    /// `return expr ;` or `return ;` (void functions only).
    Return(Option<Expr>),
    /// A bare expression statement; must have type `void`.
    Expr(Expr),
}

/// The left-hand side of an assignment.
#[derive(Clone, Debug, PartialEq)]
pub enum AssignTarget {
    /// A named variable.
    Name(String),
    /// A raw memory location: `` `addr_expr = value ``.
    Mem(Expr),
}

/// An expression with its source position.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

impl Expr {
    /// Create an expression node.
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

/// Expression variants.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Boolean literal.
    Bool(bool),
    /// Variable reference.
    Name(String),
    /// Binary operation.
    Infix {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation.
    Prefix { op: UnaryOp, operand: Box<Expr> },
    /// Function call.
    Call { name: String, args: Vec<Expr> },
    /// Numeric cast: `int(expr)` or `float(expr)`.
    Cast { to: Type, value: Box<Expr> },
    /// Raw memory load: `` `expr ``.
    MemLoad(Box<Expr>),
    /// Memory grow: `^expr`. Evaluates to the new memory size.
    MemGrow(Box<Expr>),
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// The operator's source spelling, used in diagnostics.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// Identity (`+`).
    Plus,
    /// Negation (`-`).
    Neg,
    /// Logical not (`!`).
    Not,
}

impl UnaryOp {
    /// The operator's source spelling, used in diagnostics.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Neg => "-",
            Self::Not => "!",
        }
    }
}
