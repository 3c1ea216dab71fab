//! Workflow template parsing and defaults extraction.
//!
//! An exported ComfyUI workflow identifies its fields only by node id and
//! positional widget index. [`extract_defaults`] reads the eight fixed node
//! roles of the asset workflow and flattens their widget values into a
//! [`DefaultsBundle`] that every asset build falls back to.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{is_truthy, NodeId, WidgetValue};

// ---------------------------------------------------------------------------
// Node roles (fixed by the exported template)
// ---------------------------------------------------------------------------

/// Checkpoint loader: model, VAE and CLIP names.
pub const CHECKPOINT_NODE: NodeId = 1;

/// Positive prompt text encoder.
pub const POSITIVE_NODE: NodeId = 2;

/// Negative prompt text encoder.
pub const NEGATIVE_NODE: NodeId = 3;

/// Empty latent image: width, height, batch size.
pub const LATENT_NODE: NodeId = 4;

/// KSampler: seed, steps, cfg, sampler, scheduler, denoise.
pub const SAMPLER_NODE: NodeId = 5;

/// VAE decode. Carries no widgets but must be present.
pub const VAE_DECODE_NODE: NodeId = 6;

/// Metadata stamp: field name and value template.
pub const METADATA_NODE: NodeId = 7;

/// Save image: output prefix.
pub const SAVE_NODE: NodeId = 8;

/// Every node id the template must contain, in lookup order.
pub const REQUIRED_NODES: [NodeId; 8] = [
    CHECKPOINT_NODE,
    POSITIVE_NODE,
    NEGATIVE_NODE,
    LATENT_NODE,
    SAMPLER_NODE,
    VAE_DECODE_NODE,
    METADATA_NODE,
    SAVE_NODE,
];

/// Default batch size when the latent node omits index 2.
pub const DEFAULT_BATCH_SIZE: i64 = 1;

/// Default denoise strength when the sampler node omits index 5.
pub const DEFAULT_DENOISE: i64 = 1;

/// Default metadata field name.
pub const DEFAULT_METADATA_KEY: &str = "asset_id";

/// Default metadata value template.
pub const DEFAULT_METADATA_VALUE: &str = "{id}";

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// An exported workflow document. Only `nodes` is read; other fields
/// (links, groups, extra) are ignored.
///
/// Node records stay raw JSON: custom nodes may carry any shape (object
/// `widgets_values`, string ids), and only the eight role nodes are
/// interpreted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowTemplate {
    #[serde(default)]
    pub nodes: Vec<serde_json::Value>,
}

/// The positional view of one role node.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub id: NodeId,
    pub widgets_values: Vec<WidgetValue>,
}

/// Flat set of defaults read from the template.
///
/// Values are the raw widget values; coercion to integer or float happens
/// when a prompt graph is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefaultsBundle {
    pub model_name: WidgetValue,
    pub vae_name: WidgetValue,
    pub clip_name: WidgetValue,
    pub positive_prompt: WidgetValue,
    pub negative_prompt: WidgetValue,
    pub width: WidgetValue,
    pub height: WidgetValue,
    pub batch_size: WidgetValue,
    pub seed: WidgetValue,
    pub steps: WidgetValue,
    pub cfg: WidgetValue,
    pub sampler_name: WidgetValue,
    pub scheduler: WidgetValue,
    pub denoise: WidgetValue,
    pub metadata_key: WidgetValue,
    pub metadata_value: WidgetValue,
    pub output_prefix: WidgetValue,
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

impl WorkflowTemplate {
    /// Deserialize a template from an already-parsed JSON document.
    pub fn from_value(json: serde_json::Value) -> Result<Self, CoreError> {
        Ok(serde_json::from_value(json)?)
    }
}

impl TemplateNode {
    /// Interpret a raw node record.
    ///
    /// Returns `None` when the record has no integer `id`. A missing or
    /// non-array `widgets_values` reads as an empty list.
    pub fn from_record(record: &serde_json::Value) -> Option<Self> {
        let id = record.get("id")?.as_i64()?;
        let widgets_values = record
            .get("widgets_values")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Some(Self { id, widgets_values })
    }

    /// Read the widget value at `index`.
    ///
    /// When the index is out of range the fallback is used, but only if it
    /// is truthy. A falsy fallback counts as absent, so such a field still
    /// fails with [`CoreError::MissingWidget`].
    pub fn widget_value(
        &self,
        index: usize,
        fallback: Option<WidgetValue>,
    ) -> Result<WidgetValue, CoreError> {
        if let Some(value) = self.widgets_values.get(index) {
            return Ok(value.clone());
        }
        match fallback {
            Some(value) if is_truthy(&value) => Ok(value),
            _ => Err(CoreError::MissingWidget {
                node_id: self.id,
                index,
            }),
        }
    }
}

/// Extract the [`DefaultsBundle`] from a workflow template.
///
/// Fails with [`CoreError::MissingNode`] naming the first required node id
/// that is absent, or [`CoreError::MissingWidget`] for a required widget
/// index that is out of range.
pub fn extract_defaults(template: &WorkflowTemplate) -> Result<DefaultsBundle, CoreError> {
    // Later duplicates replace earlier ones.
    let mut by_id: HashMap<NodeId, &serde_json::Value> = HashMap::new();
    for record in &template.nodes {
        if let Some(id) = record.get("id").and_then(|v| v.as_i64()) {
            by_id.insert(id, record);
        }
    }

    let mut roles: HashMap<NodeId, TemplateNode> = HashMap::new();
    for node_id in REQUIRED_NODES {
        let node = by_id
            .get(&node_id)
            .and_then(|record| TemplateNode::from_record(record))
            .ok_or(CoreError::MissingNode { node_id })?;
        roles.insert(node_id, node);
    }
    let node = |id: NodeId| &roles[&id];

    let checkpoint = node(CHECKPOINT_NODE);
    let latent = node(LATENT_NODE);
    let sampler = node(SAMPLER_NODE);
    let metadata = node(METADATA_NODE);

    let defaults = DefaultsBundle {
        model_name: checkpoint.widget_value(0, None)?,
        vae_name: checkpoint.widget_value(1, None)?,
        clip_name: checkpoint.widget_value(2, None)?,
        positive_prompt: node(POSITIVE_NODE).widget_value(0, None)?,
        negative_prompt: node(NEGATIVE_NODE).widget_value(0, None)?,
        width: latent.widget_value(0, None)?,
        height: latent.widget_value(1, None)?,
        batch_size: latent.widget_value(2, Some(DEFAULT_BATCH_SIZE.into()))?,
        seed: sampler.widget_value(0, None)?,
        steps: sampler.widget_value(1, None)?,
        cfg: sampler.widget_value(2, None)?,
        sampler_name: sampler.widget_value(3, None)?,
        scheduler: sampler.widget_value(4, None)?,
        denoise: sampler.widget_value(5, Some(DEFAULT_DENOISE.into()))?,
        metadata_key: metadata.widget_value(0, Some(DEFAULT_METADATA_KEY.into()))?,
        metadata_value: metadata.widget_value(1, Some(DEFAULT_METADATA_VALUE.into()))?,
        output_prefix: node(SAVE_NODE).widget_value(0, None)?,
    };

    tracing::debug!(
        model = %defaults.model_name,
        output_prefix = %defaults.output_prefix,
        "Extracted workflow defaults",
    );

    Ok(defaults)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
