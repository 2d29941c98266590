//! Plan validation
//!
//! Rules:
//! - at least one stage
//! - stage names unique, non-empty
//! - target names unique, non-empty
//! - every stage has at least one command, no empty command lines
//! - `needs` reference known stages (cycles are rejected by `order`)
//! - selectors reference known targets / tags
//! - ssh targets declare a host
//! - settings.parallelism >= 1

use std::collections::HashSet;

use contracts::{Command, ContractError, Plan, TargetSelector, TransportKind};

/// Validate a parsed plan
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(plan: &Plan) -> Result<(), ContractError> {
    validate_settings(plan)?;
    validate_targets(plan)?;
    validate_stage_names(plan)?;
    validate_commands(plan)?;
    validate_needs(plan)?;
    validate_selectors(plan)?;
    Ok(())
}

fn validate_settings(plan: &Plan) -> Result<(), ContractError> {
    if plan.settings.parallelism == 0 {
        return Err(ContractError::plan_load(
            "settings.parallelism",
            "parallelism must be >= 1",
        ));
    }
    Ok(())
}

/// Target names unique, ssh targets reachable
fn validate_targets(plan: &Plan) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, target) in plan.targets.iter().enumerate() {
        if target.name.trim().is_empty() {
            return Err(ContractError::plan_load(
                format!("targets[{idx}].name"),
                "target name cannot be empty",
            ));
        }
        if !seen.insert(&target.name) {
            return Err(ContractError::plan_load(
                format!("targets[{idx}].name"),
                format!("duplicate target name '{}'", target.name),
            ));
        }
        if target.transport == TransportKind::Ssh
            && target.host.as_deref().is_none_or(|h| h.trim().is_empty())
        {
            return Err(ContractError::plan_load(
                format!("targets[{idx}].host"),
                "ssh target requires a host",
            ));
        }
    }
    Ok(())
}

/// Stage names unique
fn validate_stage_names(plan: &Plan) -> Result<(), ContractError> {
    if plan.stages.is_empty() {
        return Err(ContractError::plan_load("stages", "plan declares no stages"));
    }

    let mut seen = HashSet::new();
    for (idx, stage) in plan.stages.iter().enumerate() {
        if stage.name.trim().is_empty() {
            return Err(ContractError::plan_load(
                format!("stages[{idx}].name"),
                "stage name cannot be empty",
            ));
        }
        if !seen.insert(&stage.name) {
            return Err(ContractError::plan_load(
                format!("stages[{idx}].name"),
                format!("duplicate stage name '{}'", stage.name),
            ));
        }
    }
    Ok(())
}

fn validate_commands(plan: &Plan) -> Result<(), ContractError> {
    for stage in &plan.stages {
        if stage.commands.is_empty() {
            return Err(ContractError::plan_load(
                format!("stages[{}].commands", stage.name),
                "stage must declare at least one command",
            ));
        }
        let all = stage.commands.iter().map(|c| ("commands", c));
        let rollback = stage.rollback.iter().map(|c| ("rollback", c));
        for (idx, (field, command)) in all.chain(rollback).enumerate() {
            let empty = match command {
                Command::Shell(line) => line.trim().is_empty(),
                Command::Transfer { transfer } => {
                    transfer.local.trim().is_empty() || transfer.remote.trim().is_empty()
                }
            };
            if empty {
                return Err(ContractError::plan_load(
                    format!("stages[{}].{field}", stage.name),
                    format!("command #{} is empty", idx + 1),
                ));
            }
        }
        if stage.timeout_secs == Some(0) {
            return Err(ContractError::plan_load(
                format!("stages[{}].timeout_secs", stage.name),
                "timeout_secs must be > 0",
            ));
        }
    }
    Ok(())
}

fn validate_needs(plan: &Plan) -> Result<(), ContractError> {
    let names: HashSet<_> = plan.stages.iter().map(|s| s.name.as_str()).collect();
    for stage in &plan.stages {
        for need in &stage.needs {
            if need == &stage.name {
                return Err(ContractError::plan_load(
                    format!("stages[{}].needs", stage.name),
                    "stage cannot depend on itself",
                ));
            }
            if !names.contains(need.as_str()) {
                return Err(ContractError::plan_load(
                    format!("stages[{}].needs", stage.name),
                    format!("depends on unknown stage '{need}'"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_selectors(plan: &Plan) -> Result<(), ContractError> {
    for stage in &plan.stages {
        match &stage.targets {
            TargetSelector::All => {}
            TargetSelector::Names(names) => {
                if names.is_empty() {
                    return Err(ContractError::plan_load(
                        format!("stages[{}].targets", stage.name),
                        "target list cannot be empty",
                    ));
                }
                for name in names {
                    if plan.target(name).is_none() {
                        return Err(ContractError::plan_load(
                            format!("stages[{}].targets", stage.name),
                            format!("unknown target '{name}'"),
                        ));
                    }
                }
            }
            TargetSelector::Tag { tag } => {
                if !plan.targets.iter().any(|t| t.has_tag(tag)) {
                    return Err(ContractError::plan_load(
                        format!("stages[{}].targets", stage.name),
                        format!("no target carries tag '{tag}'"),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Non-fatal findings, reported by `deploy validate`
pub fn warnings(plan: &Plan) -> Vec<String> {
    let mut warnings = Vec::new();

    if plan.targets.is_empty() {
        warnings.push("No targets declared - nothing will be deployed".to_string());
    }

    for stage in &plan.stages {
        if !stage.rollback.is_empty()
            && stage.on_failure != contracts::FailurePolicy::RollbackToPrevious
        {
            warnings.push(format!(
                "Stage '{}' declares rollback commands but its policy is {:?}; they will never run",
                stage.name, stage.on_failure
            ));
        }
        if stage.cleanup && !stage.needs.is_empty() {
            warnings.push(format!(
                "Cleanup stage '{}' declares needs; cleanup stages run regardless",
                stage.name
            ));
        }
    }

    warnings
}
