//! # Command Execution
//!
//! The external tool is reached through the [`CommandExecutor`] trait so the
//! handler can be exercised against a stub instead of a real GPU job.

use crate::transcription::command::CommandLine;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// What a finished process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a command to completion and captures both output streams.
///
/// ## Rust Concepts:
/// - **#[async_trait]**: Makes the async method usable through `Arc<dyn CommandExecutor>`
/// - **Send + Sync**: The executor is shared by every actix worker thread
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &CommandLine) -> std::io::Result<ProcessOutput>;
}

/// Production executor backed by `tokio::process`.
///
/// The child inherits the server's environment. `kill_on_drop` makes sure a
/// run abandoned by a timeout does not keep the GPU busy.
#[derive(Debug, Default, Clone)]
pub struct TokioCommandExecutor;

#[async_trait]
impl CommandExecutor for TokioCommandExecutor {
    async fn run(&self, command: &CommandLine) -> std::io::Result<ProcessOutput> {
        let mut process = Command::new(command.program());
        process
            .args(command.get_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = command.working_dir() {
            process.current_dir(dir);
        }

        debug!(command = %command, "Spawning process");
        let output = process.output().await?;

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
