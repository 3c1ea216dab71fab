//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps prompt submission (`POST /prompt`) using [`reqwest`].

use serde::{Deserialize, Serialize};

use assetq_core::prompt::PromptGraph;

/// Reported when the server response carries no `prompt_id`.
pub const UNKNOWN_PROMPT_ID: &str = "<unknown>";

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body of a `POST /prompt` request.
#[derive(Debug, Serialize)]
pub struct PromptRequest<'a> {
    pub prompt: &'a PromptGraph,
    pub client_id: &'a str,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// queuing a workflow.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    #[serde(default)]
    pub prompt_id: Option<String>,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<i64>,
}

impl SubmitResponse {
    /// The prompt id, or [`UNKNOWN_PROMPT_ID`] when the server omitted it.
    pub fn prompt_id_or_unknown(&self) -> &str {
        self.prompt_id.as_deref().unwrap_or(UNKNOWN_PROMPT_ID)
    }
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`. A trailing
    ///   slash is stripped.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// HTTP API base URL without a trailing slash.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a prompt graph for execution.
    ///
    /// Sends a `POST /prompt` request with the graph and client ID as a
    /// JSON body. Returns the server-assigned `prompt_id` and queue
    /// position when the server reports them.
    pub async fn submit_prompt(
        &self,
        request: &PromptRequest<'_>,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        tracing::debug!(client_id = request.client_id, url = %self.api_url, "Submitting prompt");

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
