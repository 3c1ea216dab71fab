//! Asset specification records.
//!
//! The asset spec is a JSON array of objects, each naming one image to
//! generate plus optional overrides of the template defaults.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::WidgetValue;

/// Fallback `client_id` for an asset that carries no id.
pub const DEFAULT_CLIENT_ID: &str = "1989";

/// One caller-specified unit of work.
///
/// Overrides are kept as raw JSON. An absent key is `None`; a key that is
/// present is `Some`, even when its value is `null`, so an explicit
/// `"vae": null` resolves to null instead of the template default.
/// Numeric overrides are coerced when the prompt is built, so `"512"` and
/// `512` are both accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Validated when the prompt is built, not when the spec is loaded.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub positive: Option<WidgetValue>,
    #[serde(default, deserialize_with = "present")]
    pub negative: Option<WidgetValue>,
    #[serde(default, deserialize_with = "present")]
    pub width: Option<WidgetValue>,
    #[serde(default, deserialize_with = "present")]
    pub height: Option<WidgetValue>,
    #[serde(default, deserialize_with = "present")]
    pub seed: Option<WidgetValue>,
    #[serde(default, deserialize_with = "present")]
    pub steps: Option<WidgetValue>,
    #[serde(default, deserialize_with = "present")]
    pub cfg: Option<WidgetValue>,
    #[serde(default, deserialize_with = "present")]
    pub sampler: Option<WidgetValue>,
    #[serde(default, deserialize_with = "present")]
    pub scheduler: Option<WidgetValue>,
    #[serde(default, deserialize_with = "present")]
    pub model: Option<WidgetValue>,
    #[serde(default, deserialize_with = "present")]
    pub vae: Option<WidgetValue>,
    #[serde(default, deserialize_with = "present")]
    pub output_prefix: Option<WidgetValue>,
}

/// Any value for a key that exists, `null` included.
fn present<'de, D>(deserializer: D) -> Result<Option<WidgetValue>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    WidgetValue::deserialize(deserializer).map(Some)
}

impl AssetRecord {
    /// Record with only an id set.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Client id sent alongside the prompt.
    pub fn client_id(&self) -> &str {
        self.id.as_deref().unwrap_or(DEFAULT_CLIENT_ID)
    }
}

/// Parse an asset spec document into records.
///
/// The document must be an array and every element an object; an empty
/// array is rejected as well. Nothing is built until the whole document
/// has been checked.
pub fn parse_asset_spec(json: serde_json::Value) -> Result<Vec<AssetRecord>, CoreError> {
    let serde_json::Value::Array(entries) = json else {
        return Err(CoreError::Validation(
            "Asset spec must be a JSON array".to_string(),
        ));
    };

    if entries.iter().any(|entry| !entry.is_object()) {
        return Err(CoreError::Validation(
            "Each asset entry must be a JSON object".to_string(),
        ));
    }

    if entries.is_empty() {
        return Err(CoreError::Validation(
            "No assets found in the specification file".to_string(),
        ));
    }

    let assets = entries
        .into_iter()
        .map(serde_json::from_value::<AssetRecord>)
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(count = assets.len(), "Parsed asset spec");
    Ok(assets)
}
