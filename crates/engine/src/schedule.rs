//! Execution schedule preview, used by dry runs

use std::collections::BTreeMap;

use contracts::{FailurePolicy, Plan, Target};

/// One stage as it would run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledStage {
    pub name: String,
    pub cleanup: bool,
    pub on_failure: FailurePolicy,
    /// Selected target names, in run order
    pub targets: Vec<String>,
    pub needs: Vec<String>,
    /// Rendered commands
    pub commands: Vec<String>,
    /// Rendered compensating commands
    pub rollback: Vec<String>,
}

/// Stages in execution order with their selected targets and rendered commands
pub fn schedule(
    plan: &Plan,
    targets: &[Target],
    variables: &BTreeMap<String, String>,
) -> Vec<ScheduledStage> {
    plan.stages
        .iter()
        .map(|stage| ScheduledStage {
            name: stage.name.clone(),
            cleanup: stage.cleanup,
            on_failure: stage.on_failure,
            targets: targets
                .iter()
                .filter(|t| stage.targets.matches(t))
                .map(|t| t.name.clone())
                .collect(),
            needs: stage.needs.clone(),
            commands: stage
                .commands
                .iter()
                .map(|c| c.render(variables).describe())
                .collect(),
            rollback: stage
                .rollback
                .iter()
                .map(|c| c.render(variables).describe())
                .collect(),
        })
        .collect()
}
