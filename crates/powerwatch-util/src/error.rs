//! Error taxonomy for powerwatchd

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of every failure the daemon can hit while handling power
/// events.
///
/// Each crate defines its own error enum and maps it onto one of these kinds
/// through a `kind()` method. The dispatcher decides what to do with a
/// failure by looking only at its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Payload could not be deserialized into a power event
    Malformed,
    /// Payload deserialized but a field is outside its enumeration
    InvalidSchema,
    /// Message arrived on a topic other than the subscribed one
    UnexpectedTopic,
    /// A policy expression failed to parse or type-check
    CompileFailure,
    /// A compiled policy expression failed against a concrete event
    EvalFailure,
    /// The shutdown action itself failed
    ActionFailure,
}

impl ErrorKind {
    /// Kinds that terminate the daemon regardless of the strict flag.
    pub fn is_always_fatal(self) -> bool {
        matches!(self, ErrorKind::CompileFailure | ErrorKind::ActionFailure)
    }

    /// Whether a failure of this kind stops the daemon under the given mode.
    pub fn is_fatal(self, strict: bool) -> bool {
        strict || self.is_always_fatal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Malformed => "malformed",
            ErrorKind::InvalidSchema => "invalid_schema",
            ErrorKind::UnexpectedTopic => "unexpected_topic",
            ErrorKind::CompileFailure => "compile_failure",
            ErrorKind::EvalFailure => "eval_failure",
            ErrorKind::ActionFailure => "action_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
