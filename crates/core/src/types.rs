//! Shared primitive types.

/// Identifier of a node inside an exported workflow template.
pub type NodeId = i64;

/// A single positional widget value, kept exactly as exported.
pub type WidgetValue = serde_json::Value;

/// Python-style truthiness of a JSON value.
///
/// `null`, `false`, `0`, `""`, `[]` and `{}` are falsy; everything else
/// is truthy. The template format and asset overrides both rely on this
/// to decide whether a value counts as supplied.
pub fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}
