//! # Accelerator Detection
//!
//! The transcription tool needs a GPU and is told which one through `--device-id`.
//! Detection walks an ordered list of probes and takes the first hit. There is
//! no CPU entry: without a GPU the request fails.

use crate::transcription::command::CommandLine;
use crate::transcription::executor::CommandExecutor;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long `nvidia-smi` may take before the GPU is treated as absent.
pub const CUDA_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A device the tool can run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accelerator {
    /// Which probe found it (for logs)
    pub kind: &'static str,
    /// Value passed as `--device-id`
    pub device_id: String,
}

/// One way of finding an accelerator.
///
/// ## Rust Concepts:
/// - **Trait objects**: `Box<dyn AcceleratorProbe>` lets new kinds of hardware be
///   added to the list without touching the handler
/// - **#[async_trait]**: Probes may need to shell out, so `detect` is async
#[async_trait]
pub trait AcceleratorProbe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Device identifier when the hardware is usable, `None` otherwise.
    async fn detect(&self) -> Option<String>;
}

/// NVIDIA GPUs, detected through `nvidia-smi`.
pub struct CudaProbe {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl CudaProbe {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            timeout: CUDA_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AcceleratorProbe for CudaProbe {
    fn name(&self) -> &'static str {
        "cuda"
    }

    async fn detect(&self) -> Option<String> {
        let command = CommandLine::new("nvidia-smi").arg("--list-gpus");
        // A wedged driver can hang nvidia-smi; the child is killed when the future drops
        match tokio::time::timeout(self.timeout, self.executor.run(&command)).await {
            Ok(Ok(output)) if output.success() && output.stdout.contains("GPU 0") => {
                debug!("CUDA device 0 available");
                Some("0".to_string())
            }
            Ok(Ok(output)) => {
                debug!(exit_code = ?output.exit_code, "CUDA not available");
                None
            }
            Ok(Err(e)) => {
                debug!(error = %e, "CUDA not available");
                None
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs_f64(), "nvidia-smi timed out, treating CUDA as unavailable");
                None
            }
        }
    }
}

/// Apple silicon GPUs through Metal Performance Shaders.
pub struct MpsProbe;

#[async_trait]
impl AcceleratorProbe for MpsProbe {
    fn name(&self) -> &'static str {
        "mps"
    }

    async fn detect(&self) -> Option<String> {
        if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
            debug!("MPS available");
            Some("mps".to_string())
        } else {
            debug!("MPS not available on this platform");
            None
        }
    }
}

/// Ordered accelerator probes, optionally short-circuited by a pinned device.
pub struct Accelerators {
    pinned: Option<String>,
    probes: Vec<Box<dyn AcceleratorProbe>>,
}

impl Accelerators {
    pub fn new(probes: Vec<Box<dyn AcceleratorProbe>>) -> Self {
        Self { pinned: None, probes }
    }

    /// CUDA first, then MPS.
    pub fn system(executor: Arc<dyn CommandExecutor>) -> Self {
        Self::new(vec![Box::new(CudaProbe::new(executor)), Box::new(MpsProbe)])
    }

    /// Skip probing and always use `device_id` (e.g. `"1"` on a multi-GPU host).
    pub fn pinned(mut self, device_id: Option<String>) -> Self {
        self.pinned = device_id;
        self
    }

    /// Find the first available accelerator.
    pub async fn resolve(&self) -> Option<Accelerator> {
        if let Some(device_id) = &self.pinned {
            return Some(Accelerator {
                kind: "pinned",
                device_id: device_id.clone(),
            });
        }

        for probe in &self.probes {
            if let Some(device_id) = probe.detect().await {
                info!(kind = probe.name(), device_id = %device_id, "Accelerator detected");
                return Some(Accelerator {
                    kind: probe.name(),
                    device_id,
                });
            }
        }

        None
    }
}
