pub mod transcribe;

pub use transcribe::*;

use crate::health;
use actix_web::web;

/// Register every route. Shared by `main` and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health::read_root))
        .route("/health", web::get().to(health::read_root))
        .route("/transcribe/", web::post().to(transcribe_audio))
        .route("/transcribe", web::post().to(transcribe_audio));
}
