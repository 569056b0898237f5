//! # Transcription Module
//!
//! Everything between a validated upload and the JSON transcript. The actual
//! speech recognition and diarization happen in an external tool
//! (`insanely-fast-whisper` by default); this module prepares its inputs,
//! runs it, and collects its output.
//!
//! ## Key Components:
//! - **Workspace**: Per-request scratch directory, always removed afterwards
//! - **Command**: Argument list built from configuration and request paths
//! - **Executor**: Runs the command without blocking other requests
//! - **Pipeline**: Ties the steps together and maps failures to `AppError`

pub mod command;     // Command-line construction with secret masking
pub mod executor;    // Subprocess execution behind a trait
pub mod pipeline;    // Request-level orchestration
pub mod workspace;   // Temporary directory lifecycle

pub use pipeline::TranscriptionPipeline;
