//! Workflow documents as exported by the editor.
//!
//! The JSON shape is `{ "id"?, "name"?, "nodes": [...], "edges": [...] }`
//! with `{id, type, data}` nodes and `{source, target, sourceHandle?,
//! targetHandle?}` edges. Loading does not validate the graph; that happens
//! when the document is run.

use crate::edge::Edge;
use crate::engine::RunRequest;
use crate::error::{DocumentError, GraphError};
use crate::graph::WorkflowGraph;
use crate::node::{Node, NodeId};
use canvasflow_core::WorkflowId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;

/// A saved workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<WorkflowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowDocument {
    #[must_use]
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            id: None,
            name: None,
            nodes,
            edges,
        }
    }

    /// Parses a document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Malformed`] if the text is not a workflow
    /// document.
    pub fn from_json_str(json: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(json).map_err(|e| DocumentError::Malformed {
            reason: e.to_string(),
        })
    }

    /// Parses a document from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Malformed`] if the bytes are not a workflow
    /// document.
    pub fn from_json_slice(json: &[u8]) -> Result<Self, DocumentError> {
        serde_json::from_slice(json).map_err(|e| DocumentError::Malformed {
            reason: e.to_string(),
        })
    }

    /// Reads and parses a document file.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Io`] if the file cannot be read and
    /// [`DocumentError::Malformed`] if it does not parse.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| DocumentError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_slice(&bytes)
    }

    /// Builds and validates the graph without running it.
    ///
    /// # Errors
    ///
    /// Returns the first [`GraphError`] found.
    pub fn graph(&self) -> Result<WorkflowGraph, GraphError> {
        WorkflowGraph::from_parts(self.nodes.iter().cloned(), self.edges.iter().cloned())
    }

    /// Turns the document into a run request with the given inputs.
    #[must_use]
    pub fn into_request(self, inputs: BTreeMap<NodeId, JsonValue>) -> RunRequest {
        RunRequest {
            nodes: self.nodes,
            edges: self.edges,
            inputs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use serde_json::json;
    use std::io::Write;

    const EDITOR_EXPORT: &str = r#"{
        "name": "summarize",
        "nodes": [
            { "id": "form", "type": "input", "data": { "label": "Topic" } },
            { "id": "chat", "type": "llm_chat", "data": { "model": "small", "retries": 1 } },
            { "id": "out", "type": "output" }
        ],
        "edges": [
            { "source": "form", "target": "chat", "targetHandle": "prompt" },
            { "source": "chat", "target": "out" }
        ]
    }"#;

    #[test]
    fn parses_editor_export() {
        let document = WorkflowDocument::from_json_str(EDITOR_EXPORT).expect("parse");

        assert_eq!(document.name.as_deref(), Some("summarize"));
        assert_eq!(document.nodes.len(), 3);
        assert_eq!(document.nodes[1].kind, NodeKind::LlmChat);
        assert_eq!(document.nodes[1].retries(), 1);
        assert_eq!(document.edges[0].target_port.as_deref(), Some("prompt"));
        assert!(document.graph().is_ok());
    }

    #[test]
    fn missing_nodes_is_malformed() {
        let err = WorkflowDocument::from_json_str(r#"{ "edges": [] }"#).unwrap_err();
        assert!(matches!(err, DocumentError::Malformed { .. }));
    }

    #[test]
    fn edges_default_to_empty() {
        let document =
            WorkflowDocument::from_json_str(r#"{ "nodes": [{ "id": "a", "type": "merge" }] }"#)
                .expect("parse");
        assert!(document.edges.is_empty());
    }

    #[test]
    fn cyclic_document_loads_but_fails_validation() {
        let document = WorkflowDocument::from_json_str(
            r#"{
                "nodes": [{ "id": "a", "type": "merge" }, { "id": "b", "type": "merge" }],
                "edges": [{ "source": "a", "target": "b" }, { "source": "b", "target": "a" }]
            }"#,
        )
        .expect("parse");
        assert!(matches!(document.graph(), Err(GraphError::CycleDetected { .. })));
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(EDITOR_EXPORT.as_bytes()).expect("write");

        let document = WorkflowDocument::from_path(file.path()).expect("load");
        assert_eq!(document.nodes.len(), 3);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = WorkflowDocument::from_path(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }

    #[test]
    fn into_request_carries_inputs() {
        let document = WorkflowDocument::from_json_str(EDITOR_EXPORT).expect("parse");
        let inputs = BTreeMap::from([(NodeId::from("form"), json!("rust"))]);

        let request = document.into_request(inputs);

        assert_eq!(request.nodes.len(), 3);
        assert_eq!(request.edges.len(), 2);
        assert_eq!(request.inputs.get("form"), Some(&json!("rust")));
    }
}
