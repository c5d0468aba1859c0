//! Workflow node types.
//!
//! A node is one typed unit of work on the canvas. It carries:
//! - An id authored in the editor (unique within a workflow)
//! - A kind tag selecting the handler
//! - An opaque config blob; the engine only reads `timeout` and `retries`

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Borrow;
use std::fmt;
use std::time::Duration;

/// Identifier of a node within a workflow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The closed set of node kinds the editor knows about.
///
/// Tags that are not recognised deserialize to [`NodeKind::Custom`] so that a
/// graph authored with a newer palette still loads; such nodes run through
/// whatever handler is registered for the tag, or the pass-through fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    /// User-submitted form values enter the graph here.
    Input,
    /// Explicit sink; its value is part of the run result.
    Output,
    /// Chat-completion call.
    LlmChat,
    /// Embedding call.
    Embeddings,
    /// Image generation call.
    ImageGeneration,
    /// Generic HTTP fetch.
    HttpRequest,
    /// Combines several inbound values.
    Merge,
    /// Boolean routing.
    Condition,
    /// Waits before passing its input on.
    Delay,
    /// Iterates over an inbound list.
    Loop,
    /// Any other tag.
    Custom(String),
}

impl NodeKind {
    /// Returns the wire tag for this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::LlmChat => "llm_chat",
            Self::Embeddings => "embeddings",
            Self::ImageGeneration => "image_generation",
            Self::HttpRequest => "http_request",
            Self::Merge => "merge",
            Self::Condition => "condition",
            Self::Delay => "delay",
            Self::Loop => "loop",
            Self::Custom(tag) => tag,
        }
    }

    /// Returns true for kinds whose value always belongs to the run result.
    #[must_use]
    pub fn is_sink(&self) -> bool {
        matches!(self, Self::Output)
    }
}

impl From<String> for NodeKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "input" => Self::Input,
            "output" => Self::Output,
            "llm_chat" => Self::LlmChat,
            "embeddings" => Self::Embeddings,
            "image_generation" => Self::ImageGeneration,
            "http_request" => Self::HttpRequest,
            "merge" => Self::Merge,
            "condition" => Self::Condition,
            "delay" => Self::Delay,
            "loop" => Self::Loop,
            _ => Self::Custom(tag),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Custom(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique id within the workflow.
    pub id: NodeId,
    /// Handler selector.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Handler-specific configuration. Editors export this as `data`.
    #[serde(default, alias = "data")]
    pub config: JsonValue,
}

impl Node {
    /// Creates a node with an empty config.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, kind: impl Into<NodeKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            config: JsonValue::Null,
        }
    }

    /// Replaces the node config.
    #[must_use]
    pub fn with_config(mut self, config: JsonValue) -> Self {
        self.config = config;
        self
    }

    /// Per-attempt time limit from `config.timeout` (milliseconds).
    ///
    /// Zero, negative or missing values mean no limit.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        let ms = self.config_number("timeout")?;
        (ms > 0).then(|| Duration::from_millis(ms))
    }

    /// Number of extra attempts from `config.retries`; defaults to zero.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.config_number("retries")
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
    }

    /// Non-negative integer config value. Editors may emit whole numbers as
    /// floats (`2.0`), so positive floats are truncated.
    fn config_number(&self, key: &str) -> Option<u64> {
        let raw = self.config.get(key)?;
        raw.as_u64()
            .or_else(|| raw.as_f64().filter(|v| v.is_finite() && *v > 0.0).map(|v| v as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_tags_map_to_variants() {
        assert_eq!(NodeKind::from("llm_chat"), NodeKind::LlmChat);
        assert_eq!(NodeKind::from("output"), NodeKind::Output);
        assert_eq!(
            NodeKind::from("sentiment"),
            NodeKind::Custom("sentiment".to_string())
        );
    }

    #[test]
    fn only_output_kind_is_a_sink() {
        assert!(NodeKind::Output.is_sink());
        assert!(!NodeKind::Input.is_sink());
        assert!(!NodeKind::Custom("output_like".into()).is_sink());
    }

    #[test]
    fn node_deserializes_editor_shape() {
        let node: Node = serde_json::from_value(json!({
            "id": "chat-1",
            "type": "llm_chat",
            "data": { "model": "small", "timeout": 1500, "retries": 2 }
        }))
        .expect("deserialize");

        assert_eq!(node.id.as_str(), "chat-1");
        assert_eq!(node.kind, NodeKind::LlmChat);
        assert_eq!(node.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(node.retries(), 2);
    }

    #[test]
    fn custom_kind_serializes_back_to_its_tag() {
        let node = Node::new("x", "webhook_reply");
        let value = serde_json::to_value(&node).expect("serialize");
        assert_eq!(value["type"], "webhook_reply");
    }

    #[test]
    fn zero_or_missing_timeout_means_none() {
        assert_eq!(Node::new("a", "merge").timeout(), None);
        let zero = Node::new("a", "merge").with_config(json!({ "timeout": 0 }));
        assert_eq!(zero.timeout(), None);
        let negative = Node::new("a", "merge").with_config(json!({ "timeout": -5 }));
        assert_eq!(negative.timeout(), None);
    }

    #[test]
    fn float_numbers_from_editors_are_accepted() {
        let node = Node::new("a", "merge").with_config(json!({ "retries": 2.0, "timeout": 1500.0 }));
        assert_eq!(node.retries(), 2);
        assert_eq!(node.timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn invalid_retries_default_to_zero() {
        let node = Node::new("a", "merge").with_config(json!({ "retries": "three" }));
        assert_eq!(node.retries(), 0);
        let negative = Node::new("a", "merge").with_config(json!({ "retries": -1 }));
        assert_eq!(negative.retries(), 0);
    }
}
