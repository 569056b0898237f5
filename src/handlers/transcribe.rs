//! # Transcription Endpoint
//!
//! `POST /transcribe/` with a multipart `file` field. Returns the tool's JSON
//! transcript unchanged, or `{"detail": ...}` with a generic message.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcription::TranscriptionPipeline;
use actix_multipart::Multipart;
use actix_web::http::header::ContentType;
use actix_web::{web, HttpResponse};
use futures_util::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{error, info};

/// Multipart field holding the audio.
pub const UPLOAD_FIELD: &str = "file";

/// An uploaded file, fully buffered.
#[derive(Debug)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Transcribe an uploaded audio file.
///
/// ## Endpoint: `POST /transcribe/`
///
/// ## Responses:
/// - `200`: transcript JSON exactly as written by the tool
/// - `400`: `{"detail": "Invalid file type."}` when the content is not audio
/// - `413`: upload larger than `MAX_UPLOAD_MB`
/// - `500`: `{"detail": "..."}` for missing GPU, tool failure, or internal errors
///
/// ## Rust Concepts:
/// - **catch_unwind**: A panic inside the pipeline becomes a 500 instead of a
///   dropped connection; `AssertUnwindSafe` is fine because nothing is shared
///   mutably across the boundary
pub async fn transcribe_audio(
    state: web::Data<AppState>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let upload = read_upload(payload, &state).await?;
    info!(
        filename = upload.filename.as_deref().unwrap_or("-"),
        declared_type = upload.content_type.as_deref().unwrap_or("-"),
        size_bytes = upload.bytes.len(),
        "Upload received"
    );

    let pipeline = TranscriptionPipeline::new(&state);
    let transcript = match AssertUnwindSafe(pipeline.run(&upload.bytes)).catch_unwind().await {
        Ok(Ok(transcript)) => transcript,
        Ok(Err(err)) => {
            if matches!(err, AppError::Internal(_)) {
                error!(error = %err, "An error occurred during transcription");
            }
            return Err(err);
        }
        Err(panic) => {
            // The backtrace was logged from the panic site by the panic hook
            let message = panic_message(&*panic);
            error!(panic = %message, "Transcription task panicked");
            return Err(AppError::Internal(format!("panic: {}", message)));
        }
    };

    Ok(HttpResponse::Ok()
        .content_type(ContentType::json())
        .body(transcript))
}

/// Buffer the `file` field, enforcing the upload limit as chunks arrive.
///
/// Other fields are drained and ignored; only the first `file` field counts.
async fn read_upload(mut payload: Multipart, state: &AppState) -> AppResult<Upload> {
    let limit_bytes = state.config.max_upload_bytes();
    let mut upload: Option<Upload> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?;

        let disposition = field.content_disposition();
        let is_upload = upload.is_none()
            && disposition.and_then(|cd| cd.get_name()) == Some(UPLOAD_FIELD);
        let filename = disposition
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let content_type = field.content_type().map(|m| m.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {}", e)))?;
            if !is_upload {
                continue;
            }
            if bytes.len() + chunk.len() > limit_bytes {
                return Err(AppError::PayloadTooLarge(state.config.server.max_upload_mb));
            }
            bytes.extend_from_slice(&chunk);
        }

        if is_upload {
            upload = Some(Upload {
                filename,
                content_type,
                bytes,
            });
        }
    }

    upload.ok_or_else(|| AppError::BadRequest(format!("Field '{}' is required.", UPLOAD_FIELD)))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
