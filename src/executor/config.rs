//! Executor configuration.

use crate::core::ActiveStrategy;
use serde::{Deserialize, Serialize};

/// What to do when a transition targets a history pseudostate that has
/// nothing saved and no default transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryFailover {
    /// Abort the step with [`ExecutionError::UnreachableHistory`](super::ExecutionError::UnreachableHistory).
    #[default]
    Fail,
    /// Treat the transition as disabled until the region saves history.
    Disable,
}

/// Tunables of an [`Executor`](super::Executor).
///
/// # Example
///
/// ```rust
/// use orthogon::executor::{ExecutorConfig, HistoryFailover};
///
/// let config = ExecutorConfig::new()
///     .history_failover(HistoryFailover::Disable)
///     .max_completion_iterations(16);
///
/// let parsed = ExecutorConfig::from_json(r#"{ "history_failover": "Disable" }"#).unwrap();
/// assert_eq!(parsed.history_failover, config.history_failover);
/// assert!(parsed.auto_start);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub history_failover: HistoryFailover,
    /// Upper bound on completion-loop iterations within one step.
    pub max_completion_iterations: usize,
    /// Start the machine on the first `take` instead of denying the event.
    pub auto_start: bool,
    /// Force an active-state strategy instead of the one the metadata picks.
    pub strategy: Option<ActiveStrategy>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            history_failover: HistoryFailover::Fail,
            max_completion_iterations: 64,
            auto_start: true,
            strategy: None,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history_failover(mut self, failover: HistoryFailover) -> Self {
        self.history_failover = failover;
        self
    }

    pub fn max_completion_iterations(mut self, limit: usize) -> Self {
        self.max_completion_iterations = limit.max(1);
        self
    }

    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    pub fn strategy(mut self, strategy: ActiveStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Parse a configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fail_fast_and_auto_start() {
        let config = ExecutorConfig::default();
        assert_eq!(config.history_failover, HistoryFailover::Fail);
        assert!(config.auto_start);
        assert_eq!(config.strategy, None);
    }

    #[test]
    fn iteration_limit_is_at_least_one() {
        assert_eq!(
            ExecutorConfig::new()
                .max_completion_iterations(0)
                .max_completion_iterations,
            1
        );
    }

    #[test]
    fn json_overrides_selected_fields() {
        let config =
            ExecutorConfig::from_json(r#"{ "auto_start": false, "strategy": "Orthogonal" }"#)
                .unwrap();
        assert!(!config.auto_start);
        assert_eq!(config.strategy, Some(ActiveStrategy::Orthogonal));
        assert_eq!(config.max_completion_iterations, 64);
    }
}
