//! Engine configuration

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{Plan, PlanSettings};
use transport::RetryPolicy;

/// Execution tuning, usually built from `PlanSettings` plus CLI overrides
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum targets executing concurrently within a stage
    pub parallelism: usize,
    /// Bound on connection attempts per target
    pub connect_retry: RetryPolicy,
    /// Per-command timeout when the stage sets none
    pub command_timeout: Option<Duration>,
    /// Variables layered over `Plan::variables`
    pub variables: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_settings(&PlanSettings::default())
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &PlanSettings) -> Self {
        Self {
            parallelism: settings.parallelism.max(1),
            connect_retry: RetryPolicy::new(
                settings.transport_retries,
                Duration::from_millis(settings.retry_backoff_ms),
            ),
            command_timeout: settings.command_timeout_secs.map(Duration::from_secs),
            variables: BTreeMap::new(),
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_connect_retry(mut self, retry: RetryPolicy) -> Self {
        self.connect_retry = retry;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Plan variables overridden by the configured ones
    pub fn resolve_variables(&self, plan: &Plan) -> BTreeMap<String, String> {
        let mut variables = plan.variables.clone();
        variables.extend(self.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        variables
    }
}
