//! # Command Construction
//!
//! Builds the argument list for the external transcription tool from the
//! configuration, the request's workspace paths, and the resolved device.

use crate::config::TranscriptionConfig;
use std::fmt;
use std::path::{Path, PathBuf};

/// A program invocation: what to run, with which arguments, and where.
///
/// Arguments added through [`CommandLine::secret_arg`] are masked in the
/// `Display` and `Debug` output, so the value can be logged safely.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    secret_positions: Vec<usize>,
    working_dir: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an argument whose value must not appear in logs.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret_positions.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Value following `flag`, if the flag is present.
    #[cfg(test)]
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.secret_positions.contains(&i) {
                f.write_str(" ***")?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandLine")
            .field("command", &self.to_string())
            .field("working_dir", &self.working_dir)
            .finish()
    }
}

/// Builder for the transcription tool's command line.
///
/// ## Argument order:
/// `--file-name`, `--transcript-path`, `--model-name`, `--task`, `--batch-size`,
/// `--diarization_model`, `--hf-token`, `--device-id`, then `--max-speakers` and
/// `--min-speakers` only when configured. Unset bounds are left out entirely;
/// the tool treats an empty value as an error.
pub struct TranscriptionCommand;

impl TranscriptionCommand {
    pub fn build(
        config: &TranscriptionConfig,
        input_path: &Path,
        output_path: &Path,
        device_id: &str,
        working_dir: &Path,
    ) -> CommandLine {
        let mut command = CommandLine::new(config.executable.as_str())
            .arg("--file-name")
            .arg(input_path.to_string_lossy())
            .arg("--transcript-path")
            .arg(output_path.to_string_lossy())
            .args(["--model-name", config.model_name.as_str()])
            .args(["--task", config.task.as_str()])
            .arg("--batch-size")
            .arg(config.batch_size.to_string())
            .args(["--diarization_model", config.diarization_model.as_str()])
            .arg("--hf-token")
            .secret_arg(config.hf_token.expose())
            .args(["--device-id", device_id]);

        if let Some(max) = config.max_speakers {
            command = command.arg("--max-speakers").arg(max.to_string());
        }
        if let Some(min) = config.min_speakers {
            command = command.arg("--min-speakers").arg(min.to_string());
        }

        command.current_dir(working_dir)
    }
}
