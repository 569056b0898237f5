//! # Application State
//!
//! Everything a request handler needs, built once at startup and shared
//! read-only between actix workers.
//!
//! ## Key Rust Concepts:
//! - **Arc (Atomically Reference Counted)**: Every worker thread holds a cheap
//!   handle to the same config, executor and probe list
//! - **No locks**: Nothing here changes after startup, so there is no `RwLock`;
//!   each request keeps its own workspace, command and result on its own stack
//! - **Trait objects**: `Arc<dyn CommandExecutor>` is where tests plug in a stub

use crate::config::AppConfig;
use crate::device::Accelerators;
use crate::transcription::executor::{CommandExecutor, TokioCommandExecutor};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Validated configuration, read once at process start
    pub config: Arc<AppConfig>,

    /// Runs the external transcription tool
    pub executor: Arc<dyn CommandExecutor>,

    /// Ordered accelerator probes
    pub accelerators: Arc<Accelerators>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        executor: Arc<dyn CommandExecutor>,
        accelerators: Accelerators,
    ) -> Self {
        Self {
            config: Arc::new(config),
            executor,
            accelerators: Arc::new(accelerators),
        }
    }

    /// Production wiring: real processes and the system probe list.
    ///
    /// ## What this does:
    /// 1. Creates the tokio-backed executor
    /// 2. Builds the CUDA → MPS probe list on top of it
    /// 3. Pins the device when `TRANSCRIPTION_DEVICE_ID` is set
    pub fn from_config(config: AppConfig) -> Self {
        let executor: Arc<dyn CommandExecutor> = Arc::new(TokioCommandExecutor);
        let accelerators = Accelerators::system(executor.clone())
            .pinned(config.transcription.device_id.clone());
        Self::new(config, executor, accelerators)
    }
}
