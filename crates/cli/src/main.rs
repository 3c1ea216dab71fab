//! `assetq` -- batch queueing front-end for a ComfyUI server.
//!
//! Reads an exported workflow template and a JSON list of assets, builds
//! one prompt graph per asset and queues it via `POST /prompt` (or prints
//! it with `--dry-run`).
//!
//! # Environment variables
//!
//! | Variable      | Required | Default                 | Description                 |
//! |---------------|----------|-------------------------|-----------------------------|
//! | `COMFYUI_URL` | no       | `http://127.0.0.1:8188` | Server when `--server` is not given |
//! | `RUST_LOG`    | no       | `assetq=info`           | Log filter (logs go to stderr) |

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assetq_cli::config::Cli;
use assetq_cli::driver;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assetq=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match driver::execute(&cli, &mut out).await {
        Ok(count) => {
            tracing::info!(count, dry_run = cli.dry_run, "Run complete");
        }
        Err(e) if e.is_usage_error() => {
            Cli::command().error(ErrorKind::ValueValidation, e).exit();
        }
        Err(e) => {
            tracing::error!(error = %e, "Run aborted");
            // Logs may be filtered out; the user always gets the message.
            let _ = e.write_diagnostic(&mut std::io::stderr());
            std::process::exit(1);
        }
    }
}
