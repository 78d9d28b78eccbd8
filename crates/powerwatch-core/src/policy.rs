//! Compiled arm/disarm policy

use powerwatch_api::{PowerEvent, policy_schema};
use powerwatch_expr::{CompileError, EvalError, Predicate};
use powerwatch_util::ErrorKind;
use std::fmt;
use thiserror::Error;

/// Which of the two policy expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Evaluated while idle; true schedules a shutdown
    Arm,
    /// Evaluated while armed; true cancels the pending shutdown
    Disarm,
}

impl Slot {
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Arm => "arm",
            Slot::Disarm => "disarm",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy errors
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to compile {slot} expression '{text}': {error}")]
    Compile {
        slot: Slot,
        text: String,
        #[source]
        error: CompileError,
    },

    #[error("Failed to evaluate {slot} expression '{text}': {error}")]
    Eval {
        slot: Slot,
        text: String,
        #[source]
        error: EvalError,
    },
}

impl PolicyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PolicyError::Compile { .. } => ErrorKind::CompileFailure,
            PolicyError::Eval { .. } => ErrorKind::EvalFailure,
        }
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;

/// A boolean predicate over one power event
#[derive(Debug, Clone)]
pub struct PolicyExpression {
    slot: Slot,
    predicate: Predicate,
}

impl PolicyExpression {
    /// Compile against the power event schema.
    ///
    /// Fails on CEL syntax errors, undeclared variables, type errors and
    /// expressions whose result is not a boolean.
    pub fn compile(slot: Slot, text: &str) -> PolicyResult<Self> {
        let predicate =
            Predicate::compile(text, &policy_schema()).map_err(|error| PolicyError::Compile {
                slot,
                text: text.to_string(),
                error,
            })?;
        Ok(Self { slot, predicate })
    }

    pub fn source(&self) -> &str {
        self.predicate.source()
    }

    /// Evaluate against an event. Pure and always terminates.
    pub fn evaluate(&self, event: &PowerEvent) -> PolicyResult<bool> {
        self.predicate
            .test(&event.activation())
            .map_err(|error| PolicyError::Eval {
                slot: self.slot,
                text: self.source().to_string(),
                error,
            })
    }
}

/// The arm and disarm expressions, compiled once at startup
#[derive(Debug, Clone)]
pub struct PolicySet {
    arm: PolicyExpression,
    disarm: PolicyExpression,
}

impl PolicySet {
    pub fn compile(arm: &str, disarm: &str) -> PolicyResult<Self> {
        Ok(Self {
            arm: PolicyExpression::compile(Slot::Arm, arm)?,
            disarm: PolicyExpression::compile(Slot::Disarm, disarm)?,
        })
    }

    pub fn arm(&self) -> &PolicyExpression {
        &self.arm
    }

    pub fn disarm(&self) -> &PolicyExpression {
        &self.disarm
    }
}
