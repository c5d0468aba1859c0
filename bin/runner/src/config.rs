//! Runner configuration.
//!
//! Loaded via the `config` crate from `CANVASFLOW__*` environment variables,
//! with `__` separating nested keys:
//!
//! - `CANVASFLOW__WORKFLOW_PATH`: workflow document to run
//! - `CANVASFLOW__INPUTS_PATH`: optional JSON object of inputs keyed by node id
//! - `CANVASFLOW__ENGINE__CONCURRENCY`, `CANVASFLOW__ENGINE__DOWNSTREAM_POLICY`,
//!   `CANVASFLOW__ENGINE__RUN_TIMEOUT_MS`, `CANVASFLOW__ENGINE__RETRY_BACKOFF__STRATEGY`, ...
//!
//! A workflow path given on the command line overrides the environment.

use canvasflow_workflow::EngineConfig;
use serde::Deserialize;
use std::path::PathBuf;

const ENV_PREFIX: &str = "CANVASFLOW";

/// Runner configuration composed from the engine config.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Workflow document to run.
    pub workflow_path: PathBuf,

    /// JSON object of external inputs keyed by node id.
    #[serde(default)]
    pub inputs_path: Option<PathBuf>,

    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Pretty-print the run result.
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_pretty() -> bool {
    true
}

impl RunnerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env(workflow_path: Option<String>) -> Result<Self, config::ConfigError> {
        Self::from_environment(environment(), workflow_path)
    }

    fn from_environment(
        env: config::Environment,
        workflow_path: Option<String>,
    ) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(env)
            .set_override_option("workflow_path", workflow_path)?
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvasflow_workflow::{DownstreamPolicy, RetryBackoff};
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn engine_defaults_apply() {
        let config = RunnerConfig::from_environment(
            env(&[("CANVASFLOW__WORKFLOW_PATH", "flow.json")]),
            None,
        )
        .expect("load");

        assert_eq!(config.workflow_path, PathBuf::from("flow.json"));
        assert!(config.inputs_path.is_none());
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.pretty);
    }

    #[test]
    fn nested_engine_settings_are_read() {
        let config = RunnerConfig::from_environment(
            env(&[
                ("CANVASFLOW__WORKFLOW_PATH", "flow.json"),
                ("CANVASFLOW__ENGINE__CONCURRENCY", "8"),
                ("CANVASFLOW__ENGINE__DOWNSTREAM_POLICY", "skip"),
                ("CANVASFLOW__ENGINE__RUN_TIMEOUT_MS", "5000"),
            ]),
            None,
        )
        .expect("load");

        assert_eq!(config.engine.concurrency, 8);
        assert_eq!(config.engine.downstream_policy, DownstreamPolicy::Skip);
        assert_eq!(config.engine.run_timeout_ms, Some(5000));
        assert_eq!(config.engine.retry_backoff, RetryBackoff::Immediate);
    }

    #[test]
    fn command_line_path_overrides_environment() {
        let config = RunnerConfig::from_environment(
            env(&[("CANVASFLOW__WORKFLOW_PATH", "from-env.json")]),
            Some("from-args.json".to_string()),
        )
        .expect("load");

        assert_eq!(config.workflow_path, PathBuf::from("from-args.json"));
    }

    #[test]
    fn missing_workflow_path_is_an_error() {
        let result = RunnerConfig::from_environment(env(&[]), None);
        assert!(result.is_err());
    }
}
