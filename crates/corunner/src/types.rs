use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Environment variable overriding [`SchedulerConfig::concurrency`].
pub const CONCURRENCY_ENV: &str = "CORUNNER_CONCURRENCY";

/// Lifecycle state of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerStatus {
    /// Never started. Submissions queue up.
    Idle,
    /// Admitting and running work.
    Active,
    /// Started, but admission is gated. Running tasks continue.
    Paused,
    /// Stopped; the queue was discarded. May be started again.
    Stopped,
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of simultaneously running tasks. 0 = available parallelism.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize { 0 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string, then apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedulerError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// `CORUNNER_CONCURRENCY` overrides `concurrency`. Unparseable values
    /// are ignored.
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(CONCURRENCY_ENV) {
            if let Ok(n) = v.trim().parse::<usize>() {
                self.concurrency = n;
            } else {
                tracing::warn!("Ignoring invalid {}={:?}", CONCURRENCY_ENV, v);
            }
        }
    }

    /// Resolve the concurrency bound (0 means use available parallelism).
    pub fn resolved_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.concurrency
        }
    }
}
