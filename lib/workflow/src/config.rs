//! Engine configuration.
//!
//! Loaded by the runner through the `config` crate; every field has a
//! default so an empty source yields a working engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Tuning knobs for [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of nodes per wave.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// What happens to a node whose predecessor did not succeed.
    #[serde(default)]
    pub downstream_policy: DownstreamPolicy,

    /// Delay between attempts of the same node.
    #[serde(default)]
    pub retry_backoff: RetryBackoff,

    /// Whole-run deadline in milliseconds; absent means none.
    #[serde(default)]
    pub run_timeout_ms: Option<u64>,
}

fn default_concurrency() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            downstream_policy: DownstreamPolicy::default(),
            retry_backoff: RetryBackoff::default(),
            run_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_downstream_policy(mut self, policy: DownstreamPolicy) -> Self {
        self.downstream_policy = policy;
        self
    }

    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.retry_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Wave size; a configured zero is treated as one.
    #[must_use]
    pub fn wave_size(&self) -> usize {
        self.concurrency.max(1)
    }

    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Treatment of a ready node when at least one predecessor did not succeed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownstreamPolicy {
    /// Run it anyway; missing inbound values are `None`.
    #[default]
    AttemptAnyway,
    /// Mark it `skipped`.
    Skip,
    /// Mark it `blocked`.
    Block,
}

impl DownstreamPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AttemptAnyway => "attempt_anyway",
            Self::Skip => "skip",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for DownstreamPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delay applied before each retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryBackoff {
    /// Retry straight away.
    #[default]
    Immediate,
    /// Same delay before every retry.
    Fixed { delay_ms: u64 },
    /// `initial_ms` doubled per retry, capped at `max_ms`.
    Exponential { initial_ms: u64, max_ms: u64 },
}

impl RetryBackoff {
    /// Delay before retry number `retry` (1 for the first retry).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        match *self {
            Self::Immediate => Duration::ZERO,
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential { initial_ms, max_ms } => {
                let shift = retry.saturating_sub(1).min(63);
                let factor = 1u64 << shift;
                Duration::from_millis(initial_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}
