//! Policy expressions for powerwatchd
//!
//! Expressions are written in CEL and run by `cel-interpreter`. On top of
//! that, each expression is type-checked once against a [`Schema`]:
//! - identifiers must be declared in the schema
//! - operands and function arguments must have compatible types
//! - a [`Predicate`] must yield `bool`
//!
//! A compiled predicate can then only fail at runtime on arithmetic faults
//! or on an activation that does not match its schema.

mod check;
mod program;
mod types;

pub use program::*;
pub use types::*;

use thiserror::Error;

/// Errors raised while compiling an expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Undeclared identifier '{name}'")]
    UndeclaredIdent { name: String },

    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Type error: {0}")]
    Type(String),

    #[error("Unsupported expression: {0}")]
    Unsupported(String),

    #[error("Expression yields {found}, expected {expected}")]
    OutputType { expected: Type, found: Type },
}

/// Errors raised while evaluating a compiled expression
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("Variable '{0}' is not bound")]
    Unbound(String),

    #[error("Variable '{name}' is bound to {found}, declared {expected}")]
    Binding {
        name: String,
        expected: Type,
        found: Type,
    },

    #[error("{0}")]
    Execution(String),

    #[error("Expected bool, found {0}")]
    NotBool(String),
}

pub type CompileResult<T> = Result<T, CompileError>;
pub type EvalResult<T> = Result<T, EvalError>;
