//! Command-line configuration.

use std::path::PathBuf;

use clap::Parser;

/// ComfyUI server used when neither `--server` nor `COMFYUI_URL` is set.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8188";

/// Queue ComfyUI jobs for a list of asset descriptions.
#[derive(Debug, Clone, Parser)]
#[command(name = "assetq", version)]
pub struct Cli {
    /// Path to the exported workflow template JSON.
    #[arg(long, value_name = "PATH")]
    pub workflow: PathBuf,

    /// Asset specification JSON file.
    #[arg(long = "json", value_name = "PATH")]
    pub assets: PathBuf,

    /// ComfyUI server URL.
    #[arg(long, env = "COMFYUI_URL", default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Print prompts instead of queuing them.
    #[arg(long)]
    pub dry_run: bool,
}
