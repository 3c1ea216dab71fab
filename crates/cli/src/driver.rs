//! Submission driver.
//!
//! Loads the template and asset spec, builds one prompt graph per asset
//! and either prints it (dry run) or queues it on the ComfyUI server.
//! Assets are processed strictly one at a time in input order, and the
//! first failure of any kind aborts the whole run: a bad asset is never
//! skipped and a failed submission is never retried.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;

use assetq_comfyui::api::{ComfyUIApi, ComfyUIApiError, PromptRequest, SubmitResponse};
use assetq_core::asset::{parse_asset_spec, AssetRecord};
use assetq_core::prompt::build_prompt;
use assetq_core::template::{extract_defaults, DefaultsBundle, WorkflowTemplate};

use crate::config::Cli;
use crate::error::QueueError;

/// Something that can queue a prompt request.
#[async_trait]
pub trait PromptSubmitter: Sync {
    /// Base URL reported in diagnostics.
    fn server(&self) -> &str;

    async fn submit(&self, request: &PromptRequest<'_>) -> Result<SubmitResponse, ComfyUIApiError>;
}

#[async_trait]
impl PromptSubmitter for ComfyUIApi {
    fn server(&self) -> &str {
        self.api_url()
    }

    async fn submit(&self, request: &PromptRequest<'_>) -> Result<SubmitResponse, ComfyUIApiError> {
        self.submit_prompt(request).await
    }
}

/// Run a full invocation against the server named in `cli`.
///
/// Returns the number of assets processed.
pub async fn execute<W: Write>(cli: &Cli, out: &mut W) -> Result<usize, QueueError> {
    let api = ComfyUIApi::new(cli.server.as_str());
    execute_with(cli, &api, out).await
}

/// Like [`execute`] with an explicit submitter.
pub async fn execute_with<S, W>(cli: &Cli, submitter: &S, out: &mut W) -> Result<usize, QueueError>
where
    S: PromptSubmitter + ?Sized,
    W: Write,
{
    let template_json = load_json(&cli.workflow).await?;
    let template = WorkflowTemplate::from_value(template_json).map_err(QueueError::Template)?;
    let defaults = extract_defaults(&template).map_err(QueueError::Template)?;

    let assets = load_assets(&cli.assets).await?;

    tracing::info!(
        assets = assets.len(),
        dry_run = cli.dry_run,
        server = submitter.server(),
        "Processing asset spec",
    );

    run(&defaults, &assets, cli.dry_run, submitter, out).await
}

/// Build and dispatch a prompt for every asset, in order.
///
/// In dry-run mode each `{"prompt", "client_id"}` payload is written to
/// `out` as indented JSON and `submitter` is never called. Otherwise each
/// payload is submitted and a `Queued <id> as prompt <prompt_id>` line is
/// written to `out`.
pub async fn run<S, W>(
    defaults: &DefaultsBundle,
    assets: &[AssetRecord],
    dry_run: bool,
    submitter: &S,
    out: &mut W,
) -> Result<usize, QueueError>
where
    S: PromptSubmitter + ?Sized,
    W: Write,
{
    for asset in assets {
        let graph = build_prompt(asset, defaults).map_err(QueueError::Prompt)?;
        let request = PromptRequest {
            prompt: &graph,
            client_id: asset.client_id(),
        };

        if dry_run {
            serde_json::to_writer_pretty(&mut *out, &request).map_err(std::io::Error::from)?;
            writeln!(out)?;
            continue;
        }

        let response = submitter
            .submit(&request)
            .await
            .map_err(|source| QueueError::Unreachable {
                server: submitter.server().to_string(),
                source,
            })?;

        let prompt_id = response.prompt_id_or_unknown();
        tracing::info!(asset_id = request.client_id, prompt_id, "Queued asset");
        writeln!(out, "Queued {} as prompt {prompt_id}", request.client_id)?;
    }

    Ok(assets.len())
}

async fn load_json(path: &Path) -> Result<serde_json::Value, QueueError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| QueueError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&text).map_err(|source| QueueError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate the asset spec. Unparsable JSON is reported the same
/// way as a document of the wrong shape.
async fn load_assets(path: &Path) -> Result<Vec<AssetRecord>, QueueError> {
    let json = match load_json(path).await {
        Ok(json) => json,
        Err(QueueError::Parse { source, .. }) => {
            return Err(QueueError::AssetSpec(source.into()));
        }
        Err(e) => return Err(e),
    };
    parse_asset_spec(json).map_err(QueueError::AssetSpec)
}
