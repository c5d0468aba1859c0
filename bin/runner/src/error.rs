//! Runner error types.

use canvasflow_workflow::DocumentError;
use std::fmt;

/// Errors from preparing or executing a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    /// The workflow document could not be loaded.
    Document(DocumentError),
    /// The inputs file could not be read or is not a JSON object.
    Inputs { path: String, details: String },
    /// The engine rejected the run; the engine report is attached as a child.
    Engine { workflow: String },
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(e) => write!(f, "workflow document error: {e}"),
            Self::Inputs { path, details } => {
                write!(f, "cannot load inputs from {path}: {details}")
            }
            Self::Engine { workflow } => write!(f, "workflow run failed: {workflow}"),
        }
    }
}

impl std::error::Error for RunnerError {}

impl From<DocumentError> for RunnerError {
    fn from(e: DocumentError) -> Self {
        Self::Document(e)
    }
}
