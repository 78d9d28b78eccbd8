//! Shutdown action trait

use async_trait::async_trait;
use powerwatch_util::ErrorKind;
use thiserror::Error;

/// Errors from invoking the shutdown action
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}")]
    NonZeroExit { command: String, status: String },

    #[error("No shutdown command configured")]
    EmptyCommand,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ActionFailure
    }
}

pub type ActionResult<T> = Result<T, ActionError>;

/// The side-effecting operation the engine performs when a scheduled
/// shutdown comes due.
///
/// Implementations must not retry. A failed attempt is reported to the
/// caller, which treats it as fatal.
#[async_trait]
pub trait ShutdownAction: Send + Sync {
    /// Shut the machine down now.
    async fn invoke(&self) -> ActionResult<()>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}
