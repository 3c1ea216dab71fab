//! Per-asset prompt graph construction.
//!
//! [`build_prompt`] merges one [`AssetRecord`] over the template
//! [`DefaultsBundle`] and wires the fixed eight-node ComfyUI graph:
//! checkpoint (1) feeds both text encoders (2, 3) and the sampler (5),
//! which also takes the empty latent (4); the decoded image (6) is
//! stamped with metadata (7) and saved (8).

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::asset::AssetRecord;
use crate::error::CoreError;
use crate::template::DefaultsBundle;
use crate::types::{is_truthy, WidgetValue};

// ---------------------------------------------------------------------------
// ComfyUI node class types
// ---------------------------------------------------------------------------

const CHECKPOINT_LOADER_CLASS: &str = "CheckpointLoaderSimple";
const CLIP_TEXT_ENCODE_CLASS: &str = "CLIPTextEncode";
const EMPTY_LATENT_CLASS: &str = "EmptyLatentImage";
const KSAMPLER_CLASS: &str = "KSampler";
const VAE_DECODE_CLASS: &str = "VAEDecode";
const SET_METADATA_CLASS: &str = "SetMetadata";
const SAVE_IMAGE_CLASS: &str = "SaveImage";

/// Token in the metadata value template replaced by the asset id.
pub const ID_TOKEN: &str = "{id}";

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// One operation in a prompt graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptNode {
    /// Literal values and `[node_id, slot]` links.
    pub inputs: Map<String, Value>,
    pub class_type: String,
}

/// A complete job description keyed by node id (`"1"` .. `"8"`).
///
/// Serializes as a plain JSON object, the shape `POST /prompt` expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PromptGraph {
    nodes: BTreeMap<String, PromptNode>,
}

impl PromptGraph {
    /// Look up a node by its string id.
    pub fn node(&self, id: &str) -> Option<&PromptNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&mut self, id: &str, class_type: &str, inputs: Value) {
        let inputs = match inputs {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.nodes.insert(
            id.to_string(),
            PromptNode {
                inputs,
                class_type: class_type.to_string(),
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Build the prompt graph for one asset.
///
/// Overrides on the asset win over template defaults. `width`, `height`,
/// `seed` and `steps` are coerced to integers and `cfg` to a float; a value
/// that cannot be coerced fails with [`CoreError::Coercion`]. An asset
/// without a non-empty id fails with [`CoreError::Validation`].
pub fn build_prompt(
    asset: &AssetRecord,
    defaults: &DefaultsBundle,
) -> Result<PromptGraph, CoreError> {
    let asset_id = match asset.id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => {
            return Err(CoreError::Validation(
                "Every asset object must include an 'id' field".to_string(),
            ))
        }
    };

    let positive = text_or(&asset.positive, &defaults.positive_prompt);
    let negative = text_or(&asset.negative, &defaults.negative_prompt);
    let width = coerce_int("width", asset.width.as_ref().unwrap_or(&defaults.width))?;
    let height = coerce_int("height", asset.height.as_ref().unwrap_or(&defaults.height))?;
    let seed = coerce_int("seed", asset.seed.as_ref().unwrap_or(&defaults.seed))?;
    let steps = coerce_int("steps", asset.steps.as_ref().unwrap_or(&defaults.steps))?;
    let cfg = coerce_float("cfg", asset.cfg.as_ref().unwrap_or(&defaults.cfg))?;
    let sampler_name = text_or(&asset.sampler, &defaults.sampler_name);
    let scheduler = text_or(&asset.scheduler, &defaults.scheduler);
    let model_name = text_or(&asset.model, &defaults.model_name);
    let vae_name = text_or(&asset.vae, &defaults.vae_name);

    let filename_prefix = match &asset.output_prefix {
        Some(prefix) if is_truthy(prefix) => prefix.clone(),
        _ => Value::String(format!("{}/{asset_id}", display_value(&defaults.output_prefix))),
    };

    let metadata_value = defaults
        .metadata_value
        .as_str()
        .ok_or_else(|| coercion_error("metadata_value", &defaults.metadata_value, "string"))?
        .replace(ID_TOKEN, asset_id);

    let mut graph = PromptGraph {
        nodes: BTreeMap::new(),
    };

    graph.insert(
        "1",
        CHECKPOINT_LOADER_CLASS,
        json!({
            "ckpt_name": model_name,
            "vae_name": vae_name,
            "clip_name": defaults.clip_name,
        }),
    );
    graph.insert(
        "2",
        CLIP_TEXT_ENCODE_CLASS,
        json!({
            "text": positive,
            "clip": link("1", 1),
        }),
    );
    graph.insert(
        "3",
        CLIP_TEXT_ENCODE_CLASS,
        json!({
            "text": negative,
            "clip": link("1", 1),
        }),
    );
    graph.insert(
        "4",
        EMPTY_LATENT_CLASS,
        json!({
            "width": width,
            "height": height,
            "batch_size": defaults.batch_size,
        }),
    );
    graph.insert(
        "5",
        KSAMPLER_CLASS,
        json!({
            "seed": seed,
            "steps": steps,
            "cfg": cfg,
            "sampler_name": sampler_name,
            "scheduler": scheduler,
            "denoise": defaults.denoise,
            "model": link("1", 0),
            "positive": link("2", 0),
            "negative": link("3", 0),
            "latent_image": link("4", 0),
        }),
    );
    graph.insert(
        "6",
        VAE_DECODE_CLASS,
        json!({
            "samples": link("5", 0),
            "vae": link("1", 2),
        }),
    );
    graph.insert(
        "7",
        SET_METADATA_CLASS,
        json!({
            "images": link("6", 0),
            "field_name": defaults.metadata_key,
            "field_value": metadata_value,
        }),
    );
    graph.insert(
        "8",
        SAVE_IMAGE_CLASS,
        json!({
            "images": link("7", 0),
            "filename_prefix": filename_prefix,
            "filename_suffix": "",
        }),
    );

    // Empty VAE name: let ComfyUI use the checkpoint's bundled VAE.
    if !is_truthy(&vae_name) {
        if let Some(checkpoint) = graph.nodes.get_mut("1") {
            checkpoint.inputs.remove("vae_name");
        }
    }

    tracing::debug!(asset_id, filename_prefix = %filename_prefix, "Built prompt graph");
    Ok(graph)
}

/// Coerce a JSON value to an integer.
///
/// Accepts integers, floats (truncated toward zero), booleans and numeric
/// strings (surrounding whitespace ignored).
pub fn coerce_int(field: &'static str, value: &Value) -> Result<i64, CoreError> {
    let coerced = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    coerced.ok_or_else(|| coercion_error(field, value, "integer"))
}

/// Coerce a JSON value to a float.
///
/// Accepts numbers, booleans and numeric strings (surrounding whitespace
/// ignored).
pub fn coerce_float(field: &'static str, value: &Value) -> Result<f64, CoreError> {
    let coerced = match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    coerced.ok_or_else(|| coercion_error(field, value, "float"))
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// `[producer_node_id, output_slot]` reference.
fn link(node_id: &str, slot: u32) -> Value {
    json!([node_id, slot])
}

/// An override that is present wins, even when it is `null`.
fn text_or(over: &Option<WidgetValue>, default: &WidgetValue) -> Value {
    over.as_ref().unwrap_or(default).clone()
}

/// Render a widget value for string interpolation; strings are unquoted.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coercion_error(field: &'static str, value: &Value, expected: &'static str) -> CoreError {
    CoreError::Coercion {
        field,
        value: value.to_string(),
        expected,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::tests::sample_defaults;
    use assert_matches::assert_matches;

    fn inputs<'a>(graph: &'a PromptGraph, id: &str) -> &'a Map<String, Value> {
        &graph.node(id).unwrap().inputs
    }

    // -- build_prompt: defaults ---------------------------------------------

    #[test]
    fn builds_all_eight_nodes() {
        let graph = build_prompt(&AssetRecord::with_id("plate-01"), &sample_defaults()).unwrap();
        assert_eq!(graph.len(), 8);

        let classes: Vec<_> = (1..=8)
            .map(|i| graph.node(&i.to_string()).unwrap().class_type.as_str())
            .collect();
        assert_eq!(
            classes,
            vec![
                "CheckpointLoaderSimple",
                "CLIPTextEncode",
                "CLIPTextEncode",
                "EmptyLatentImage",
                "KSampler",
                "VAEDecode",
                "SetMetadata",
                "SaveImage",
            ]
        );
    }

    #[test]
    fn latent_and_prefix_use_defaults() {
        let defaults = sample_defaults();
        let graph = build_prompt(&AssetRecord::with_id("plate-01"), &defaults).unwrap();

        let latent = inputs(&graph, "4");
        assert_eq!(latent["width"], defaults.width);
        assert_eq!(latent["height"], defaults.height);
        assert_eq!(latent["batch_size"], defaults.batch_size);

        assert_eq!(
            inputs(&graph, "8")["filename_prefix"],
            json!("anthology/1989/plate-01")
        );
        assert_eq!(inputs(&graph, "8")["filename_suffix"], json!(""));
    }

    #[test]
    fn wiring_matches_fixed_shape() {
        let graph = build_prompt(&AssetRecord::with_id("a"), &sample_defaults()).unwrap();

        assert_eq!(inputs(&graph, "2")["clip"], json!(["1", 1]));
        assert_eq!(inputs(&graph, "3")["clip"], json!(["1", 1]));
        let sampler = inputs(&graph, "5");
        assert_eq!(sampler["model"], json!(["1", 0]));
        assert_eq!(sampler["positive"], json!(["2", 0]));
        assert_eq!(sampler["negative"], json!(["3", 0]));
        assert_eq!(sampler["latent_image"], json!(["4", 0]));
        assert_eq!(inputs(&graph, "6")["samples"], json!(["5", 0]));
        assert_eq!(inputs(&graph, "6")["vae"], json!(["1", 2]));
        assert_eq!(inputs(&graph, "7")["images"], json!(["6", 0]));
        assert_eq!(inputs(&graph, "8")["images"], json!(["7", 0]));
    }

    #[test]
    fn sampler_values_are_coerced() {
        let graph = build_prompt(&AssetRecord::with_id("a"), &sample_defaults()).unwrap();
        let sampler = inputs(&graph, "5");
        assert_eq!(sampler["seed"], json!(1989));
        assert_eq!(sampler["steps"], json!(28));
        assert_eq!(sampler["cfg"], json!(6.5));
        assert_eq!(sampler["denoise"], json!(0.9));
        assert_eq!(sampler["sampler_name"], json!("dpmpp_2m"));
        assert_eq!(sampler["scheduler"], json!("karras"));
    }

    // -- build_prompt: overrides --------------------------------------------

    #[test]
    fn overrides_win_over_defaults() {
        let asset = AssetRecord {
            positive: Some("neon skyline".into()),
            negative: Some("text".into()),
            width: Some(json!("1024")),
            height: Some(json!(640.9)),
            seed: Some(json!(5)),
            steps: Some(json!(" 12 ")),
            cfg: Some(json!(7)),
            sampler: Some("euler".into()),
            scheduler: Some("normal".into()),
            model: Some("sdxl.safetensors".into()),
            ..AssetRecord::with_id("x")
        };
        let graph = build_prompt(&asset, &sample_defaults()).unwrap();

        assert_eq!(inputs(&graph, "1")["ckpt_name"], json!("sdxl.safetensors"));
        assert_eq!(inputs(&graph, "2")["text"], json!("neon skyline"));
        assert_eq!(inputs(&graph, "3")["text"], json!("text"));
        assert_eq!(inputs(&graph, "4")["width"], json!(1024));
        assert_eq!(inputs(&graph, "4")["height"], json!(640));
        let sampler = inputs(&graph, "5");
        assert_eq!(sampler["seed"], json!(5));
        assert_eq!(sampler["steps"], json!(12));
        assert_eq!(sampler["cfg"], json!(7.0));
        assert_eq!(sampler["sampler_name"], json!("euler"));
        assert_eq!(sampler["scheduler"], json!("normal"));
    }

    #[test]
    fn explicit_output_prefix_is_used_verbatim() {
        let asset = AssetRecord {
            output_prefix: Some("custom/dir/name".into()),
            ..AssetRecord::with_id("x")
        };
        let graph = build_prompt(&asset, &sample_defaults()).unwrap();
        assert_eq!(inputs(&graph, "8")["filename_prefix"], json!("custom/dir/name"));
    }

    #[test]
    fn empty_output_prefix_falls_back_to_join() {
        let asset = AssetRecord {
            output_prefix: Some(json!("")),
            ..AssetRecord::with_id("x")
        };
        let graph = build_prompt(&asset, &sample_defaults()).unwrap();
        assert_eq!(inputs(&graph, "8")["filename_prefix"], json!("anthology/1989/x"));
    }

    #[test]
    fn empty_vae_override_drops_vae_name() {
        let asset = AssetRecord {
            vae: Some(json!("")),
            ..AssetRecord::with_id("x")
        };
        let graph = build_prompt(&asset, &sample_defaults()).unwrap();
        let checkpoint = inputs(&graph, "1");
        assert!(!checkpoint.contains_key("vae_name"));
        assert!(checkpoint.contains_key("ckpt_name"));
        assert!(checkpoint.contains_key("clip_name"));
    }

    #[test]
    fn empty_default_vae_drops_vae_name() {
        let defaults = DefaultsBundle {
            vae_name: json!(""),
            ..sample_defaults()
        };
        let graph = build_prompt(&AssetRecord::with_id("x"), &defaults).unwrap();
        assert!(!inputs(&graph, "1").contains_key("vae_name"));
    }

    #[test]
    fn present_vae_is_kept() {
        let graph = build_prompt(&AssetRecord::with_id("x"), &sample_defaults()).unwrap();
        assert_eq!(inputs(&graph, "1")["vae_name"], json!("vae-ft-mse.safetensors"));
    }

    #[test]
    fn null_vae_override_drops_vae_name() {
        let asset = crate::asset::parse_asset_spec(json!([{ "id": "x", "vae": null }]))
            .unwrap()
            .remove(0);
        let graph = build_prompt(&asset, &sample_defaults()).unwrap();
        assert!(!inputs(&graph, "1").contains_key("vae_name"));
    }

    #[test]
    fn null_text_override_is_sent_as_null() {
        let asset = AssetRecord {
            positive: Some(json!(null)),
            ..AssetRecord::with_id("x")
        };
        let graph = build_prompt(&asset, &sample_defaults()).unwrap();
        assert_eq!(inputs(&graph, "2")["text"], json!(null));
    }

    #[test]
    fn null_numeric_override_is_a_type_error() {
        let asset = AssetRecord {
            width: Some(json!(null)),
            ..AssetRecord::with_id("x")
        };
        assert_matches!(
            build_prompt(&asset, &sample_defaults()),
            Err(CoreError::Coercion { field: "width", .. })
        );
    }

    #[test]
    fn non_string_output_prefix_is_used_verbatim() {
        let asset = AssetRecord {
            output_prefix: Some(json!(42)),
            ..AssetRecord::with_id("x")
        };
        let graph = build_prompt(&asset, &sample_defaults()).unwrap();
        assert_eq!(inputs(&graph, "8")["filename_prefix"], json!(42));
    }

    #[test]
    fn metadata_value_substitutes_id() {
        let graph = build_prompt(&AssetRecord::with_id("x7"), &sample_defaults()).unwrap();
        assert_eq!(inputs(&graph, "7")["field_value"], json!("id=x7"));
        assert_eq!(inputs(&graph, "7")["field_name"], json!("asset"));
    }

    #[test]
    fn metadata_substitution_is_not_recursive() {
        let defaults = DefaultsBundle {
            metadata_value: json!("{id}:{id}"),
            ..sample_defaults()
        };
        let graph = build_prompt(&AssetRecord::with_id("{id}"), &defaults).unwrap();
        assert_eq!(inputs(&graph, "7")["field_value"], json!("{id}:{id}"));
    }

    #[test]
    fn non_string_metadata_template_is_a_type_error() {
        let defaults = DefaultsBundle {
            metadata_value: json!(3),
            ..sample_defaults()
        };
        assert_matches!(
            build_prompt(&AssetRecord::with_id("x"), &defaults),
            Err(CoreError::Coercion { field: "metadata_value", .. })
        );
    }

    // -- build_prompt: failures ---------------------------------------------

    #[test]
    fn missing_id_is_rejected() {
        let err = build_prompt(&AssetRecord::default(), &sample_defaults()).unwrap_err();
        assert_eq!(err.to_string(), "Every asset object must include an 'id' field");
    }

    #[test]
    fn empty_id_is_rejected() {
        assert_matches!(
            build_prompt(&AssetRecord::with_id(""), &sample_defaults()),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn non_numeric_override_is_a_type_error() {
        let asset = AssetRecord {
            seed: Some(json!("lucky")),
            ..AssetRecord::with_id("x")
        };
        let err = build_prompt(&asset, &sample_defaults()).unwrap_err();
        assert_matches!(err, CoreError::Coercion { field: "seed", expected: "integer", .. });
    }

    // -- determinism --------------------------------------------------------

    #[test]
    fn repeated_builds_serialize_identically() {
        let defaults = sample_defaults();
        let asset = AssetRecord::with_id("plate-01");
        let first = serde_json::to_string(&build_prompt(&asset, &defaults).unwrap()).unwrap();
        let second = serde_json::to_string(&build_prompt(&asset, &defaults).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn serializes_as_node_map() {
        let graph = build_prompt(&AssetRecord::with_id("a"), &sample_defaults()).unwrap();
        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["6"]["class_type"], json!("VAEDecode"));
        assert_eq!(json["6"]["inputs"]["vae"], json!(["1", 2]));
    }

    // -- coercion -----------------------------------------------------------

    #[test]
    fn coerce_int_accepts_python_int_inputs() {
        assert_eq!(coerce_int("width", &json!(512)).unwrap(), 512);
        assert_eq!(coerce_int("width", &json!(-3.7)).unwrap(), -3);
        assert_eq!(coerce_int("width", &json!(true)).unwrap(), 1);
        assert_eq!(coerce_int("width", &json!("+64")).unwrap(), 64);
    }

    #[test]
    fn coerce_int_rejects_other_inputs() {
        for value in [json!(null), json!("12.5"), json!([1]), json!({})] {
            assert_matches!(coerce_int("width", &value), Err(CoreError::Coercion { .. }));
        }
    }

    #[test]
    fn coerce_float_accepts_numbers_and_strings() {
        assert_eq!(coerce_float("cfg", &json!(7)).unwrap(), 7.0);
        assert_eq!(coerce_float("cfg", &json!("4.5")).unwrap(), 4.5);
        assert_matches!(coerce_float("cfg", &json!("high")), Err(CoreError::Coercion { .. }));
    }
}
