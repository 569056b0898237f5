//! # Transcribe Server - Main Application Entry Point
//!
//! An HTTP front end for a GPU transcription/diarization command-line tool.
//! Clients upload an audio file; the server runs the tool in a private
//! scratch directory and returns the JSON transcript it produces.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: Requests wait on the subprocess without blocking each other
//! - **modules**: Code is organized into separate modules (mod statements)
//! - **Result<T, E>**: Startup fails loudly; request errors become JSON responses
//! - **Arc**: Immutable configuration shared by every worker
//!
//! ## Application Architecture:
//! - **config**: Layered configuration (defaults, config.toml, environment)
//! - **state**: Configuration, command executor and accelerator probes for handlers
//! - **audio**: Content sniffing for uploads
//! - **device**: Ordered GPU probes
//! - **transcription**: Workspace, command construction, execution, pipeline
//! - **handlers** / **health**: HTTP endpoints
//! - **middleware**: Request logging
//! - **error**: Error types and HTTP error responses

mod audio;       // Upload content sniffing (audio.rs)
mod config;      // Configuration management (config.rs)
mod device;      // Accelerator probes (device.rs)
mod error;       // Error handling types (error.rs)
mod handlers;    // HTTP request handlers (handlers/ directory)
mod health;      // Health check endpoint (health.rs)
mod middleware;  // Custom middleware (middleware/ directory)
mod state;       // Application state (state.rs)
mod transcription; // External tool orchestration (transcription/ directory)

#[cfg(test)]
mod testing;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::AppConfig;
use crate::state::AppState;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads `.env`** so local runs can keep HF_TOKEN out of the shell history
/// 2. **Sets up logging** before anything can fail
/// 3. **Loads and validates configuration**; a missing HF_TOKEN stops the process here
/// 4. **Builds the shared state** (executor + accelerator probes)
/// 5. **Serves** until SIGINT/SIGTERM, then lets in-flight requests finish
#[actix_web::main]
async fn main() -> Result<()> {
    // .ok() means "ignore errors" - it's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;
    error::install_panic_hook();

    let config = AppConfig::load().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;
    if let Err(e) = config.validate() {
        error!(error = %e, "Server configuration error");
        return Err(e.context("Server configuration error"));
    }

    info!("Starting transcribe-server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        executable = %config.transcription.executable,
        model = %config.transcription.model_name,
        task = %config.transcription.task,
        batch_size = config.transcription.batch_size,
        diarization_model = %config.transcription.diarization_model,
        "Configuration loaded"
    );
    if config.transcription.timeout().is_none() {
        info!("Transcription timeout disabled; a hung tool will hold its request indefinitely");
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::from_config(config);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::RequestLogging)
            .configure(handlers::configure)
    })
    .disable_signals()  // Shutdown is driven by wait_for_shutdown below
    .bind(&bind_addr)
    .with_context(|| format!("binding {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Wait for either the server to finish OR a shutdown signal
    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        signal = wait_for_shutdown() => {
            info!(signal = signal, "Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g. "debug", "transcribe_server=debug")
/// - Defaults to "transcribe_server=info,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transcribe_server=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("initializing tracing")?;

    Ok(())
}

/// Resolve when SIGTERM or SIGINT arrives, returning which one.
#[cfg(unix)]
async fn wait_for_shutdown() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        _ => {
            error!("Failed to install signal handlers, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return "ctrl_c";
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "ctrl_c"
}
