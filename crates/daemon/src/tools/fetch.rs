//! Stream fetch collaborator

use std::process::Stdio;

use tokio::process::{Child, ChildStdout};

use super::ToolCommand;

/// Starts a process that writes a channel's media bytes to its stdout
///
/// Must be called from within a tokio runtime.
pub trait StreamFetcher: Send + Sync {
    fn spawn(&self, channel: &str) -> Result<(Child, ChildStdout), FetchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to start stream process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("stream process has no stdout pipe")]
    MissingStdout,
}

/// Fetcher backed by an external command
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    command: ToolCommand,
}

impl CommandFetcher {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }
}

impl StreamFetcher for CommandFetcher {
    fn spawn(&self, channel: &str) -> Result<(Child, ChildStdout), FetchError> {
        let mut child = self
            .command
            .command(channel)
            .stdout(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().ok_or(FetchError::MissingStdout)?;
        Ok((child, stdout))
    }
}
