//! Liveness probe collaborator

use std::process::ExitStatus;

use async_trait::async_trait;

use super::ToolCommand;

/// Answers whether a channel is currently live
///
/// Implementations return the probe's raw textual answer. Interpretation
/// (and the timeout) belongs to the caller.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, channel: &str) -> Result<String, ProbeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to run probe: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("probe exited with {0}")]
    Exited(ExitStatus),
}

/// Probe backed by an external command whose stdout is the answer
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: ToolCommand,
}

impl CommandProbe {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl LivenessProbe for CommandProbe {
    async fn probe(&self, channel: &str) -> Result<String, ProbeError> {
        // Dropping the future on timeout must take the process with it
        let output = self
            .command
            .command(channel)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::Exited(output.status));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_probe_stdout() {
        let probe = CommandProbe::new(ToolCommand::new("sh", ["-c", "echo True"]));
        let answer = probe.probe("anything").await.unwrap();
        assert_eq!(answer.trim(), "True");
    }

    #[tokio::test]
    async fn test_command_probe_nonzero_exit() {
        let probe = CommandProbe::new(ToolCommand::new("sh", ["-c", "echo true; exit 3"]));
        let err = probe.probe("anything").await.unwrap_err();
        assert!(matches!(err, ProbeError::Exited(_)));
    }

    #[tokio::test]
    async fn test_command_probe_missing_program() {
        let probe = CommandProbe::new(ToolCommand::new(
            "/nonexistent/streamfs-probe",
            Vec::<String>::new(),
        ));
        let err = probe.probe("anything").await.unwrap_err();
        assert!(matches!(err, ProbeError::Spawn(_)));
    }
}
