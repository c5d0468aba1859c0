//! canvasflow command-line runner.
//!
//! Loads a workflow document, runs it on the canvasflow engine and reports
//! the result.

pub mod config;
pub mod error;
pub mod handlers;

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use canvasflow_workflow::{Engine, NodeId, RunResult, WorkflowDocument, WorkflowStatus};
use rootcause::prelude::ResultExt;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Loads the configured document and inputs and runs the workflow.
///
/// # Errors
///
/// Returns an error if the document or inputs cannot be loaded, or if the
/// engine rejects the graph.
pub async fn execute(
    config: &RunnerConfig,
    cancel: CancellationToken,
) -> canvasflow_core::Result<RunResult, RunnerError> {
    let document = WorkflowDocument::from_path(&config.workflow_path).map_err(RunnerError::from)?;
    let inputs = match &config.inputs_path {
        Some(path) => load_inputs(path)?,
        None => BTreeMap::new(),
    };
    info!(
        nodes = document.nodes.len(),
        edges = document.edges.len(),
        inputs = inputs.len(),
        "Loaded workflow document"
    );

    let engine = Engine::new(handlers::registry()).with_config(config.engine.clone());
    debug!(
        registry = ?engine.registry(),
        concurrency = engine.config().wave_size(),
        downstream_policy = %engine.config().downstream_policy,
        "Engine ready"
    );

    engine
        .run_with_cancellation(document.into_request(inputs), cancel)
        .await
        .context(RunnerError::Engine {
            workflow: config.workflow_path.display().to_string(),
        })
}

/// Reads a JSON object of inputs keyed by node id.
///
/// # Errors
///
/// Returns [`RunnerError::Inputs`] if the file cannot be read or is not a
/// JSON object.
pub fn load_inputs(path: &Path) -> Result<BTreeMap<NodeId, JsonValue>, RunnerError> {
    let inputs_error = |details: String| RunnerError::Inputs {
        path: path.display().to_string(),
        details,
    };
    let bytes = std::fs::read(path).map_err(|e| inputs_error(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| inputs_error(e.to_string()))
}

/// Process exit code for a finished run.
#[must_use]
pub fn exit_code(status: WorkflowStatus) -> u8 {
    match status {
        WorkflowStatus::Completed | WorkflowStatus::CompletedWithSkips => 0,
        WorkflowStatus::Timeout => 124,
        WorkflowStatus::Cancelled => 130,
        WorkflowStatus::Failed
        | WorkflowStatus::Pending
        | WorkflowStatus::Running
        | WorkflowStatus::Paused => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvasflow_workflow::{EngineConfig, NodeStatus};
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DOCUMENT: &str = r#"{
        "name": "greeting",
        "nodes": [
            { "id": "form", "type": "input" },
            { "id": "pause", "type": "delay", "data": { "ms": 0 } },
            { "id": "out", "type": "output" }
        ],
        "edges": [
            { "source": "form", "target": "pause" },
            { "source": "pause", "target": "out" }
        ]
    }"#;

    fn temp_json(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    fn config(workflow: &NamedTempFile, inputs: Option<&NamedTempFile>) -> RunnerConfig {
        RunnerConfig {
            workflow_path: workflow.path().to_path_buf(),
            inputs_path: inputs.map(|file| file.path().to_path_buf()),
            engine: EngineConfig::default(),
            pretty: false,
        }
    }

    #[tokio::test]
    async fn runs_document_with_inputs() {
        let workflow = temp_json(DOCUMENT);
        let inputs = temp_json(r#"{ "form": { "name": "Ada" } }"#);

        let result = execute(&config(&workflow, Some(&inputs)), CancellationToken::new())
            .await
            .expect("run");

        assert_eq!(result.workflow_status, WorkflowStatus::Completed);
        assert_eq!(result.status_of("pause"), Some(NodeStatus::Success));
        assert_eq!(
            result.final_outputs.get("out"),
            Some(&Some(json!({ "name": "Ada" })))
        );
    }

    #[tokio::test]
    async fn runs_document_without_inputs() {
        let workflow = temp_json(DOCUMENT);

        let result = execute(&config(&workflow, None), CancellationToken::new())
            .await
            .expect("run");

        assert_eq!(result.final_outputs.get("out"), Some(&Some(JsonValue::Null)));
    }

    #[tokio::test]
    async fn cyclic_document_is_rejected() {
        let workflow = temp_json(
            r#"{
                "nodes": [{ "id": "a", "type": "merge" }, { "id": "b", "type": "merge" }],
                "edges": [{ "source": "a", "target": "b" }, { "source": "b", "target": "a" }]
            }"#,
        );

        let report = execute(&config(&workflow, None), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(report.current_context(), RunnerError::Engine { .. }));
        assert_eq!(report.children().len(), 1);
    }

    #[test]
    fn inputs_must_be_an_object() {
        let inputs = temp_json("[1, 2, 3]");
        let err = load_inputs(inputs.path()).unwrap_err();
        assert!(matches!(err, RunnerError::Inputs { .. }));
    }

    #[test]
    fn exit_codes_follow_workflow_status() {
        assert_eq!(exit_code(WorkflowStatus::Completed), 0);
        assert_eq!(exit_code(WorkflowStatus::CompletedWithSkips), 0);
        assert_eq!(exit_code(WorkflowStatus::Failed), 1);
        assert_eq!(exit_code(WorkflowStatus::Timeout), 124);
        assert_eq!(exit_code(WorkflowStatus::Cancelled), 130);
    }
}
