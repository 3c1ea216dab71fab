use std::io::Write;
use std::path::PathBuf;

use assetq_comfyui::api::ComfyUIApiError;
use assetq_core::error::CoreError;

/// Fatal conditions of a queueing run. Every one aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid workflow template: {0}")]
    Template(#[source] CoreError),

    #[error("{0}")]
    AssetSpec(#[source] CoreError),

    #[error("{0}")]
    Prompt(#[source] CoreError),

    #[error("Failed to reach ComfyUI at {server}: {source}")]
    Unreachable {
        server: String,
        source: ComfyUIApiError,
    },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl QueueError {
    /// Errors reported as command-line usage errors rather than crashes:
    /// a malformed or empty asset spec and a failed submission.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::AssetSpec(_) | Self::Unreachable { .. })
    }

    /// Write the `error: <message>` line shown to the user on exit,
    /// independent of the log filter.
    pub fn write_diagnostic<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "error: {self}")
    }
}
