//! Handlers the runner ships with.
//!
//! Business handlers (chat, embeddings, HTTP, ...) live outside the engine;
//! the runner only adds the control-flow kinds it can execute locally.
//! Everything else passes its inputs through.

use async_trait::async_trait;
use canvasflow_workflow::{
    HandlerError, HandlerRegistry, Node, NodeContext, NodeHandler, NodeKind, PassThroughHandler,
};
use std::time::Duration;

/// Registry used by the runner.
#[must_use]
pub fn registry() -> HandlerRegistry {
    HandlerRegistry::new().with(NodeKind::Delay, DelayHandler)
}

/// Waits `config.ms` milliseconds, then passes its inputs through.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayHandler;

impl DelayHandler {
    fn delay(node: &Node) -> Duration {
        Duration::from_millis(
            node.config
                .get("ms")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0),
        )
    }
}

#[async_trait]
impl NodeHandler for DelayHandler {
    async fn execute(&self, node: &Node, ctx: &NodeContext) -> Result<(), HandlerError> {
        tokio::select! {
            () = tokio::time::sleep(Self::delay(node)) => {}
            () = ctx.cancellation().cancelled() => return Err(HandlerError::Cancelled),
        }
        PassThroughHandler.execute(node, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvasflow_workflow::{Engine, NodeStatus, RunRequest};
    use serde_json::json;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn delay_waits_then_passes_through() {
        let request = RunRequest::new(
            [Node::new("wait", "delay").with_config(json!({ "ms": 250 }))],
            [],
        )
        .with_input("wait", json!("payload"));

        let started = Instant::now();
        let result = Engine::new(registry()).run(request).await.expect("run");

        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(result.status_of("wait"), Some(NodeStatus::Success));
        assert_eq!(result.output_of("wait"), Some(&json!("payload")));
    }

    #[test]
    fn missing_delay_defaults_to_zero() {
        assert_eq!(DelayHandler::delay(&Node::new("d", "delay")), Duration::ZERO);
    }
}
