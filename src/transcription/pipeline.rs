//! # Transcription Pipeline
//!
//! Turns validated upload bytes into the tool's JSON transcript:
//! sniff → workspace → device → command → run → read.

use crate::audio;
use crate::device::Accelerator;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcription::command::{CommandLine, TranscriptionCommand};
use crate::transcription::executor::ProcessOutput;
use crate::transcription::workspace::Workspace;
use anyhow::Context;
use serde::de::IgnoredAny;
use tracing::{debug, error, info};

pub struct TranscriptionPipeline<'a> {
    state: &'a AppState,
}

impl<'a> TranscriptionPipeline<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Run one transcription and return the transcript bytes exactly as the tool wrote them.
    ///
    /// The workspace is closed on every path that returns. A panic further down
    /// unwinds through `Workspace`'s `TempDir`, which removes it as well.
    pub async fn run(&self, upload: &[u8]) -> AppResult<Vec<u8>> {
        audio::ensure_audio(upload)?;

        let workspace = Workspace::create(self.state.config.transcription.work_dir.as_deref())?;
        let result = self.run_in(&workspace, upload).await;
        workspace.close();

        result
    }

    async fn run_in(&self, workspace: &Workspace, upload: &[u8]) -> AppResult<Vec<u8>> {
        tokio::fs::write(workspace.input_path(), upload)
            .await
            .context("writing upload to workspace")?;

        let accelerator = self.resolve_device().await?;
        info!(device_id = %accelerator.device_id, kind = accelerator.kind, "Using device");

        let command = TranscriptionCommand::build(
            &self.state.config.transcription,
            workspace.input_path(),
            workspace.output_path(),
            &accelerator.device_id,
            workspace.path(),
        );

        let output = self.execute(&command).await?;
        if !output.success() {
            error!(
                exit_code = ?output.exit_code,
                stderr = %output.stderr,
                "Transcription failed"
            );
            return Err(AppError::TranscriptionFailed);
        }
        debug!(stdout = %output.stdout, "Transcription tool finished");

        let transcript = tokio::fs::read(workspace.output_path())
            .await
            .context("reading transcript")?;
        serde_json::from_slice::<IgnoredAny>(&transcript).context("parsing transcript")?;

        Ok(transcript)
    }

    async fn resolve_device(&self) -> AppResult<Accelerator> {
        self.state.accelerators.resolve().await.ok_or_else(|| {
            error!("No GPU devices available. This application requires a GPU.");
            AppError::NoAcceleratorAvailable
        })
    }

    async fn execute(&self, command: &CommandLine) -> AppResult<ProcessOutput> {
        info!(command = %command, "Running transcription");

        let run = self.state.executor.run(command);
        let output = match self.state.config.transcription.timeout() {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(output) => output,
                Err(_) => {
                    error!(timeout_secs = limit.as_secs(), "Transcription timed out");
                    return Err(AppError::TranscriptionTimedOut);
                }
            },
            None => run.await,
        };

        Ok(output.context("launching transcription tool")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Accelerators;
    use crate::testing::{test_config, wav_bytes, StaticProbe, StubExecutor};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn state(work: &std::path::Path, executor: Arc<StubExecutor>, gpu: bool) -> AppState {
        let probe = if gpu {
            StaticProbe::present("cuda", "0")
        } else {
            StaticProbe::absent("cuda")
        };
        AppState::new(test_config(work), executor, Accelerators::new(vec![Box::new(probe)]))
    }

    #[tokio::test]
    async fn test_transcript_passed_through_byte_for_byte() {
        let work = tempfile::tempdir().unwrap();
        let transcript = r#"{"speakers": [], "chunks": [{"text": " hi", "timestamp": [0.0, 1.5]}], "text": " hi"}"#;
        let executor = Arc::new(StubExecutor::writing_transcript(transcript));
        let state = state(work.path(), executor.clone(), true);

        let bytes = TranscriptionPipeline::new(&state).run(&wav_bytes()).await.unwrap();

        assert_eq!(bytes, transcript.as_bytes());
        let call = executor.invocations().pop().unwrap();
        assert_eq!(call.input.as_deref(), Some(&wav_bytes()[..]));
        assert!(call.working_dir_existed);
    }

    #[tokio::test]
    async fn test_workspace_removed_after_failure() {
        let work = tempfile::tempdir().unwrap();
        let executor = Arc::new(StubExecutor::replying(1, "", "boom"));
        let state = state(work.path(), executor.clone(), true);

        let err = TranscriptionPipeline::new(&state).run(&wav_bytes()).await.unwrap_err();

        assert!(matches!(err, AppError::TranscriptionFailed));
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_before_creating_workspace() {
        let work = tempfile::tempdir().unwrap();
        let executor = Arc::new(StubExecutor::writing_transcript("{}"));
        let state = state(work.path(), executor.clone(), true);

        let err = TranscriptionPipeline::new(&state).run(b"not audio").await.unwrap_err();

        assert!(matches!(err, AppError::InvalidFileType));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_no_accelerator_means_no_launch() {
        let work = tempfile::tempdir().unwrap();
        let executor = Arc::new(StubExecutor::writing_transcript("{}"));
        let state = state(work.path(), executor.clone(), false);

        let err = TranscriptionPipeline::new(&state).run(&wav_bytes()).await.unwrap_err();

        assert!(matches!(err, AppError::NoAcceleratorAvailable));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_transcript_is_internal_error() {
        let work = tempfile::tempdir().unwrap();
        let executor = Arc::new(StubExecutor::replying(0, "done", ""));
        let state = state(work.path(), executor, true);

        let err = TranscriptionPipeline::new(&state).run(&wav_bytes()).await.unwrap_err();

        assert!(matches!(err, AppError::Internal(ref msg) if msg.contains("reading transcript")));
    }

    #[tokio::test]
    async fn test_invalid_transcript_json_is_internal_error() {
        let work = tempfile::tempdir().unwrap();
        let executor = Arc::new(StubExecutor::writing_transcript("{\"text\": "));
        let state = state(work.path(), executor, true);

        let err = TranscriptionPipeline::new(&state).run(&wav_bytes()).await.unwrap_err();

        assert!(matches!(err, AppError::Internal(ref msg) if msg.contains("parsing transcript")));
    }

    #[tokio::test]
    async fn test_launch_failure_is_internal_error() {
        let work = tempfile::tempdir().unwrap();
        let executor = Arc::new(StubExecutor::failing_to_spawn());
        let state = state(work.path(), executor, true);

        let err = TranscriptionPipeline::new(&state).run(&wav_bytes()).await.unwrap_err();

        assert!(matches!(err, AppError::Internal(ref msg) if msg.contains("launching transcription tool")));
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_timeout() {
        let work = tempfile::tempdir().unwrap();
        let executor = Arc::new(StubExecutor::sleeping(std::time::Duration::from_secs(30)));
        let mut config = test_config(work.path());
        config.transcription.timeout_secs = 1;
        let state = AppState::new(
            config,
            executor,
            Accelerators::new(vec![Box::new(StaticProbe::present("cuda", "0"))]),
        );

        let err = TranscriptionPipeline::new(&state).run(&wav_bytes()).await.unwrap_err();

        assert!(matches!(err, AppError::TranscriptionTimedOut));
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }
}
