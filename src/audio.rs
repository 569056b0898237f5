//! # Upload Content Sniffing
//!
//! Decides whether an upload is audio by looking at its leading bytes. The
//! client's filename and Content-Type header are not consulted.

use crate::error::{AppError, AppResult};
use std::sync::LazyLock;
use tracing::{error, info};

/// MIME type reported when no signature matches.
pub const UNKNOWN_MIME: &str = "application/octet-stream";

/// `infer`'s built-in table plus untagged MPEG audio frames.
///
/// The built-in MP3 matcher only knows an `ID3` tag or an MPEG-1 Layer III
/// frame without CRC (`FF FB`). Headerless MPEG-2/2.5 streams and CRC frames
/// are common for voice recordings, so any valid frame header counts.
static SNIFFER: LazyLock<infer::Infer> = LazyLock::new(|| {
    let mut sniffer = infer::Infer::new();
    sniffer.add("audio/mpeg", "mp3", is_mpeg_audio_frame);
    sniffer
});

/// Detect the MIME type of `bytes` from its magic numbers.
pub fn detect_mime(bytes: &[u8]) -> &'static str {
    SNIFFER
        .get(bytes)
        .map(|kind| kind.mime_type())
        .unwrap_or(UNKNOWN_MIME)
}

/// Does `buf` start with an MPEG audio frame header?
///
/// Layout: 11 sync bits, version (2), layer (2), CRC flag (1), then bitrate
/// index (4) and sample-rate index (2).
fn is_mpeg_audio_frame(buf: &[u8]) -> bool {
    if buf.len() < 4 || buf[0] != 0xFF || buf[1] & 0xE0 != 0xE0 {
        return false;
    }
    let version = (buf[1] >> 3) & 0b11;
    let layer = (buf[1] >> 1) & 0b11;
    let bitrate = buf[2] >> 4;
    let sample_rate = (buf[2] >> 2) & 0b11;

    version != 0b01 && layer != 0b00 && bitrate != 0b1111 && sample_rate != 0b11
}

/// Accept the upload only if its content sniffs as `audio/*`.
pub fn ensure_audio(bytes: &[u8]) -> AppResult<&'static str> {
    let mime = detect_mime(bytes);
    info!(mime_type = mime, "Detected MIME type");

    if !mime.starts_with("audio/") {
        error!(mime_type = mime, "Uploaded file is not an audio file");
        return Err(AppError::InvalidFileType);
    }

    Ok(mime)
}
