//! Filter compilation errors.

use thiserror::Error;

/// Result type for filter compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while compiling a filter tree.
///
/// Every variant carries enough of the offending node to point the client
/// at the problem.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Object literals, nested lists outside IN, or a non-string LIKE pattern.
    #[error("unsupported literal in {node}")]
    UnsupportedLiteral { node: String },

    /// Identifier that names no field in scope.
    #[error("unknown field '{name}'")]
    UnknownField { name: String },

    /// Operand of the wrong kind, e.g. a literal where an identifier is required.
    #[error("operator {op} {reason}: {node}")]
    InvalidOperand {
        op: String,
        reason: &'static str,
        node: String,
    },

    /// Operand count does not fit the operator.
    #[error("operator {op} expects {expected} operands, got {actual}: {node}")]
    WrongArity {
        op: String,
        expected: &'static str,
        actual: usize,
        node: String,
    },

    /// A multi-valued dimension was filtered on a dialect that cannot unnest.
    #[error("dimension '{name}' is multi-valued and the {dialect} dialect cannot unnest it")]
    UnsupportedUnnest { name: String, dialect: String },
}

impl CompileError {
    pub fn unknown_field(name: impl Into<String>) -> Self {
        Self::UnknownField { name: name.into() }
    }
}
