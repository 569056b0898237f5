//! # Error Handling
//!
//! This module defines the service's error type and how it is turned into an HTTP response.
//!
//! ## Two audiences, two messages:
//! - **Logs** get the full story through `Display` (`{}`), including the private detail
//!   carried by `Internal`
//! - **Clients** get `{"detail": "<public message>"}` from `ResponseError`, which never
//!   includes stderr output, file paths, or parser messages
//!
//! ## Key Rust Concepts:
//! - **Enums for Error Types**: Each variant is one failure the handler can report
//! - **From trait**: Lets `?` convert io/JSON/anyhow errors into `AppError::Internal`
//! - **ResponseError trait**: actix-web calls it whenever a handler returns `Err(AppError)`

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Once;
use tracing::error;

/// Errors a request can end with.
///
/// ## Error Categories:
/// - **InvalidFileType / BadRequest / PayloadTooLarge**: The client sent something unusable (4xx)
/// - **NoAcceleratorAvailable**: The host has no GPU the tool can use (500)
/// - **TranscriptionFailed / TranscriptionTimedOut**: The external tool did not produce a result (500)
/// - **Internal**: I/O, parse, or unexpected failures; the String is for logs only (500)
///
/// Configuration problems never reach a request: they stop the process at startup.
#[derive(Debug)]
pub enum AppError {
    /// Upload content was not sniffed as audio
    InvalidFileType,

    /// Malformed multipart body or missing `file` field
    BadRequest(String),

    /// Upload exceeded the configured limit (in megabytes)
    PayloadTooLarge(usize),

    /// No accelerator probe found a device
    NoAcceleratorAvailable,

    /// The external tool exited with a non-zero status
    TranscriptionFailed,

    /// The external tool exceeded the configured time limit
    TranscriptionTimedOut,

    /// Anything else that went wrong on our side
    Internal(String),
}

impl AppError {
    /// The message sent to the client. Never contains private detail.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidFileType => "Invalid file type.".to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::PayloadTooLarge(limit_mb) => {
                format!("File exceeds the {} MB upload limit.", limit_mb)
            }
            AppError::NoAcceleratorAvailable => "No GPU devices available.".to_string(),
            AppError::TranscriptionFailed => "Transcription failed.".to_string(),
            AppError::TranscriptionTimedOut => "Transcription timed out.".to_string(),
            AppError::Internal(_) => "An internal error occurred.".to_string(),
        }
    }
}

/// `Display` is what ends up in logs, so it includes the private detail.
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidFileType => write!(f, "Uploaded file is not an audio file"),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::PayloadTooLarge(limit_mb) => {
                write!(f, "Upload exceeds limit of {} MB", limit_mb)
            }
            AppError::NoAcceleratorAvailable => {
                write!(f, "No GPU devices available. This application requires a GPU")
            }
            AppError::TranscriptionFailed => write!(f, "Transcription tool exited with an error"),
            AppError::TranscriptionTimedOut => write!(f, "Transcription tool timed out"),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// HTTP mapping.
///
/// ## JSON Response Format:
/// ```json
/// { "detail": "Invalid file type." }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidFileType | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NoAcceleratorAvailable
            | AppError::TranscriptionFailed
            | AppError::TranscriptionTimedOut
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "detail": self.public_message()
        }))
    }
}

/// `{:#}` keeps the whole context chain (e.g. "reading transcript: No such file").
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(format!("I/O error: {}", err))
    }
}

/// JSON errors here come from the tool's output file, so they are our problem, not the client's.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON parsing error: {}", err))
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

/// Log every panic through `tracing` with a backtrace captured at the panic site.
///
/// By the time `catch_unwind` sees a panic the stack has already unwound, so the
/// backtrace has to be taken here. The previous hook still runs afterwards.
/// Calling this more than once has no further effect.
pub fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture();
            error!(panic = %info, backtrace = %backtrace, "Panic occurred");
            previous(info);
        }));
    });
}
