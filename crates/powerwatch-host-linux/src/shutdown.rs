//! Shutdown via external command

use async_trait::async_trait;
use powerwatch_host_api::{ActionError, ActionResult, ShutdownAction};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

/// Runs a configured command to shut the machine down
#[derive(Debug, Clone)]
pub struct CommandShutdown {
    argv: Vec<String>,
}

impl CommandShutdown {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl ShutdownAction for CommandShutdown {
    async fn invoke(&self) -> ActionResult<()> {
        let (program, args) = self.argv.split_first().ok_or(ActionError::EmptyCommand)?;
        let command = self.describe();

        info!(command = %command, "Calling shutdown");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ActionError::SpawnFailed {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(command = %command, status = %output.status, stderr = %stderr.trim(), "Shutdown command failed");
            return Err(ActionError::NonZeroExit {
                command,
                status: output.status.to_string(),
            });
        }

        info!(command = %command, "Shutdown initiated");
        Ok(())
    }

    fn describe(&self) -> String {
        self.argv.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_command_line() {
        let action = CommandShutdown::new(vec!["systemctl".into(), "poweroff".into()]);
        assert_eq!(action.describe(), "systemctl poweroff");
    }

    #[tokio::test]
    async fn successful_command() {
        let action = CommandShutdown::new(vec!["true".into()]);
        action.invoke().await.unwrap();
    }

    #[tokio::test]
    async fn failing_command_reports_exit_status() {
        let action = CommandShutdown::new(vec!["false".into()]);
        let err = action.invoke().await.unwrap_err();
        assert!(matches!(err, ActionError::NonZeroExit { ref command, .. } if command == "false"));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_failure() {
        let action = CommandShutdown::new(vec!["/nonexistent/powerwatch-shutdown".into()]);
        let err = action.invoke().await.unwrap_err();
        assert!(matches!(err, ActionError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let action = CommandShutdown::new(vec![]);
        assert!(matches!(action.invoke().await, Err(ActionError::EmptyCommand)));
    }
}
