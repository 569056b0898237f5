//! # Configuration Management
//!
//! This module loads the service configuration once at startup from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml, optional)
//! - Environment variables with the APP_ prefix (nested keys use `__`)
//! - The plain deployment variables (HF_TOKEN, PORT, TASK, ...)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Converts between Rust structs and the layered config sources
//! - **Newtype pattern**: `Secret` wraps the credential so it can't be printed by accident
//! - **Option<T>**: Optional settings (speaker bounds, device pin) are `None` when unset
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Deployment variables (HF_TOKEN, TRANSCRIPTION_BATCH_SIZE, PORT, ...)
//! 2. APP_ variables (APP_SERVER__HOST, APP_TRANSCRIPTION__TASK, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! The resulting `AppConfig` is immutable: it is validated once and then shared
//! read-only with every request through `AppState`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Tasks the transcription tool understands.
pub const SUPPORTED_TASKS: &[&str] = &["transcribe", "translate"];

/// Deployment variables and the config keys they override.
///
/// Empty values are treated as unset so that `TRANSCRIPTION_MAX_SPEAKERS=`
/// in a compose file does not turn into an empty flag.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("MAX_UPLOAD_MB", "server.max_upload_mb"),
    ("HF_TOKEN", "transcription.hf_token"),
    ("TRANSCRIPTION_EXECUTABLE", "transcription.executable"),
    ("TRANSCRIPTION_MODEL_NAME", "transcription.model_name"),
    ("TASK", "transcription.task"),
    ("TRANSCRIPTION_BATCH_SIZE", "transcription.batch_size"),
    ("TRANSCRIPTION_DIARIZATION_MODEL", "transcription.diarization_model"),
    ("TRANSCRIPTION_MIN_SPEAKERS", "transcription.min_speakers"),
    ("TRANSCRIPTION_MAX_SPEAKERS", "transcription.max_speakers"),
    ("TRANSCRIPTION_DEVICE_ID", "transcription.device_id"),
    ("TRANSCRIPTION_TIMEOUT_SECS", "transcription.timeout_secs"),
    ("TRANSCRIPTION_WORK_DIR", "transcription.work_dir"),
];

/// Main application configuration.
///
/// ## Rust Concepts:
/// - **#[derive(...)]**: `Serialize` lets the defaults seed the config builder,
///   `Deserialize` turns the merged sources back into this struct
/// - **Clone**: Tests build variations of the default config cheaply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub transcription: TranscriptionConfig,
}

/// HTTP listener settings.
///
/// ## Fields:
/// - `host`: Address to bind (`0.0.0.0` so the container port mapping works)
/// - `port`: TCP port to listen on
/// - `max_upload_mb`: Largest accepted upload, in megabytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_mb: usize,
}

/// Everything needed to build the external tool's command line.
///
/// ## Fields:
/// - `executable`: Program looked up on PATH for every request
/// - `model_name` / `diarization_model`: Hugging Face model identifiers
/// - `task`: `transcribe` or `translate`
/// - `batch_size`: Passed straight through as `--batch-size`
/// - `min_speakers` / `max_speakers`: Optional diarization bounds
/// - `hf_token`: Hugging Face credential (never logged)
/// - `device_id`: Pins the accelerator and skips probing when set
/// - `timeout_secs`: Wall-clock limit for one run, `0` means unbounded
/// - `work_dir`: Parent directory for per-request workspaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub executable: String,
    pub model_name: String,
    pub task: String,
    pub batch_size: u32,
    pub diarization_model: String,
    pub min_speakers: Option<u32>,
    pub max_speakers: Option<u32>,
    pub hf_token: Secret,
    pub device_id: Option<String>,
    pub timeout_secs: u64,
    pub work_dir: Option<PathBuf>,
}

/// A string that must never show up in logs.
///
/// ## Rust Concepts:
/// - **#[serde(transparent)]**: Serialized exactly like the inner `String`
/// - **Manual Debug impl**: `{:?}` prints `Secret(***)` instead of the value
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    #[cfg(test)]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Only the command builder should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Every setting except the credential has a sensible value, so a deployment
/// only has to provide `HF_TOKEN` to get going.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                max_upload_mb: 512,
            },
            transcription: TranscriptionConfig {
                executable: "insanely-fast-whisper".to_string(),
                model_name: "openai/whisper-tiny".to_string(),
                task: "transcribe".to_string(),
                batch_size: 24,
                diarization_model: "pyannote/speaker-diarization-3.1".to_string(),
                min_speakers: None,
                max_speakers: None,
                hf_token: Secret::default(),  // Required, so validation fails until it is set
                device_id: None,
                timeout_secs: 3600,
                work_dir: None,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::load_from(&std::env::vars().collect())
    }

    /// Load configuration from the given environment snapshot.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with APP_ prefixed variables from the snapshot
    /// 4. Override with the deployment variables listed in `ENV_OVERRIDES`
    ///
    /// ## Rust Concepts:
    /// - **Builder pattern**: Each `add_source`/`set_override` returns the builder
    /// - **?**: Any malformed value (e.g. `PORT=abc`) aborts loading with an error
    ///
    /// Taking the environment as a map keeps tests away from the real process
    /// environment, which is shared between test threads.
    pub fn load_from(env: &HashMap<String, String>) -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .source(Some(env.clone().into_iter().collect())),
            );

        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = env.get(*var).map(|v| v.trim()).filter(|v| !v.is_empty()) {
                settings = settings.set_override(*key, value.to_string())?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - The Hugging Face token is present (the service refuses to start without it)
    /// - Port, batch size and upload limit are non-zero
    /// - The task is one the tool understands
    /// - Speaker bounds are positive and ordered
    /// - Model identifiers and the executable are not blank
    pub fn validate(&self) -> Result<()> {
        let t = &self.transcription;

        if t.hf_token.is_empty() {
            return Err(anyhow::anyhow!("HF_TOKEN environment variable is not set"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_upload_mb == 0 {
            return Err(anyhow::anyhow!("Upload limit must be greater than 0"));
        }

        if t.batch_size == 0 {
            return Err(anyhow::anyhow!("Batch size must be greater than 0"));
        }

        if !SUPPORTED_TASKS.contains(&t.task.as_str()) {
            return Err(anyhow::anyhow!(
                "Unsupported task '{}', expected one of {:?}",
                t.task,
                SUPPORTED_TASKS
            ));
        }

        for (name, value) in [("executable", &t.executable), ("model_name", &t.model_name), ("diarization_model", &t.diarization_model)] {
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("Transcription {} cannot be empty", name));
            }
        }

        if t.min_speakers == Some(0) || t.max_speakers == Some(0) {
            return Err(anyhow::anyhow!("Speaker bounds must be greater than 0"));
        }

        if let (Some(min), Some(max)) = (t.min_speakers, t.max_speakers) {
            if min > max {
                return Err(anyhow::anyhow!(
                    "Minimum speakers ({}) cannot exceed maximum speakers ({})",
                    min,
                    max
                ));
            }
        }

        Ok(())
    }

    /// Upload limit in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl TranscriptionConfig {
    /// Subprocess time limit, or `None` when runs may take as long as they need.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
