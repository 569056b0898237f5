//! # Request Workspace
//!
//! Every request gets its own uniquely named scratch directory holding the
//! uploaded audio and the transcript the tool writes. The directory is removed
//! when the request ends, whatever the outcome.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// A per-request temporary directory.
///
/// ## Cleanup guarantees:
/// - `close()` removes the directory and logs (never returns) a failure
/// - Dropping without `close()` (early `?` return, panic unwinding) still removes
///   it through `TempDir`'s own `Drop`
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    root: PathBuf,
    input_path: PathBuf,
    output_path: PathBuf,
}

impl Workspace {
    /// Create a fresh workspace under `parent`, or the system temp dir when `None`.
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("transcribe-");

        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .context("creating temporary workspace")?;

        let root = dir.path().to_path_buf();
        let input_path = root.join(format!("temp_{}", Uuid::new_v4()));
        let output_path = root.join(format!("output_{}.json", Uuid::new_v4()));

        debug!(workspace = %root.display(), "Workspace created");

        Ok(Self {
            dir: Some(dir),
            root,
            input_path,
            output_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Where the upload is copied for the tool to read.
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Where the tool is told to write its transcript.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Remove the workspace. Failure is only logged.
    pub fn close(mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!(workspace = %self.root.display(), "Workspace removed"),
                Err(e) => warn!(
                    workspace = %self.root.display(),
                    error = %e,
                    "Failed to clean up temporary files"
                ),
            }
        }
    }
}
