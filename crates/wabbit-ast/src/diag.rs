//! Compiler diagnostics.
//!
//! Every phase reports problems as [`Diagnostic`] values carrying a source
//! position, a category, and a message. The conventional rendering used by
//! drivers is `path:line:col: <Kind>: <message>`.

use alloc::string::String;
use core::fmt;

/// A line/column source position (both 1-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    /// Create a position.
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Diagnostic categories, in the order the phases can produce them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Bad character, unterminated comment, malformed number.
    Lex,
    /// Unexpected or missing token.
    Parse,
    /// Unknown name, duplicate declaration, const reassignment.
    Name,
    /// Operand or result type mismatch, wrong argument count or type.
    Type,
    /// Return type mismatch or missing return on a non-void function.
    Return,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lex => "LexError",
            Self::Parse => "ParseError",
            Self::Name => "NameError",
            Self::Type => "TypeError",
            Self::Return => "ReturnError",
        };
        f.write_str(name)
    }
}

/// One user-facing compiler diagnostic.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub pos: Pos,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(pos: Pos, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            pos,
            kind,
            message: message.into(),
        }
    }

    /// Render the diagnostic with a source path prefix.
    pub fn render(&self, path: &str) -> String {
        use alloc::format;
        format!("{}:{}: {}: {}", path, self.pos, self.kind, self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.pos, self.kind, self.message)
    }
}
