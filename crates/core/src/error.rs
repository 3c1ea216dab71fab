use crate::types::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Workflow template is missing an expected node: {node_id}")]
    MissingNode { node_id: NodeId },

    #[error("Node {node_id} is missing widget index {index}")]
    MissingWidget { node_id: NodeId, index: usize },

    #[error("{0}")]
    Validation(String),

    #[error("Type error: cannot convert {field} value {value} to {expected}")]
    Coercion {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
