//! Plan - Plan Loader output
//!
//! Describes a complete deployment: targets, ordered stages, execution
//! settings, source checkout and command variables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Stage, Target};

/// Plan format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlanVersion {
    #[default]
    V1,
}

/// Validated deployment plan
///
/// `stages` are stored in execution order: declared order, adjusted only
/// where `needs` requires a stage to move after its dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub version: PlanVersion,

    /// Plan name, shown in logs
    #[serde(default = "default_plan_name")]
    pub name: String,

    #[serde(default)]
    pub settings: PlanSettings,

    /// Where the deployed files come from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceSpec>,

    /// Values for `${NAME}` placeholders in commands
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,

    /// Declared targets
    #[serde(default)]
    pub targets: Vec<Target>,

    /// Stages in execution order
    pub stages: Vec<Stage>,
}

fn default_plan_name() -> String {
    "deploy".to_string()
}

/// Execution tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSettings {
    /// Maximum targets executing concurrently within a stage
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Connection attempts per target before giving up
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,

    /// Base delay between connection attempts (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Default per-command timeout, overridden by `Stage::timeout_secs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

fn default_parallelism() -> usize {
    4
}

fn default_transport_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            transport_retries: default_transport_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            command_timeout_secs: None,
        }
    }
}

/// Source tree declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    /// Clone a git repository at a ref
    Git {
        repository: String,
        #[serde(rename = "ref", default = "default_ref")]
        reference: String,
    },
    /// Use an existing directory, relative to the plan file
    Local { path: String },
}

fn default_ref() -> String {
    "main".to_string()
}

impl Plan {
    /// Create a plan from targets and stages with default settings
    pub fn new(name: impl Into<String>, targets: Vec<Target>, stages: Vec<Stage>) -> Self {
        Self {
            version: PlanVersion::V1,
            name: name.into(),
            settings: PlanSettings::default(),
            source: None,
            variables: BTreeMap::new(),
            targets,
            stages,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Resolve target names to declared targets, all targets when `names` is empty
    ///
    /// Repeated names select the target once, at its first position.
    /// Returns the first unknown name as the error.
    pub fn select_targets(&self, names: &[String]) -> Result<Vec<Target>, String> {
        if names.is_empty() {
            return Ok(self.targets.clone());
        }
        let mut selected: Vec<Target> = Vec::with_capacity(names.len());
        for name in names {
            let target = self.target(name).ok_or_else(|| name.clone())?;
            if !selected.iter().any(|t| t.name == target.name) {
                selected.push(target.clone());
            }
        }
        Ok(selected)
    }

    pub fn cleanup_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().filter(|s| s.cleanup)
    }
}
