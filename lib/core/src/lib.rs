//! Core types shared by the canvasflow crates.
//!
//! Provides run and workflow identifiers and the rootcause-based `Result`
//! alias used across the workspace.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, WorkflowId, WorkflowRunId};
