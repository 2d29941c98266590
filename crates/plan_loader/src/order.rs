//! Stage ordering
//!
//! Execution order is the declared order, except that a stage listed in
//! another stage's `needs` always runs first. Among stages that are ready,
//! the one declared earliest wins, so plans without `needs` keep their order.

use std::collections::{BTreeSet, HashMap};

use contracts::{ContractError, Stage};

/// Order stages for execution, rejecting dependency cycles
///
/// Assumes names are unique and every need refers to a known stage.
pub fn order_stages(stages: &[Stage]) -> Result<Vec<Stage>, ContractError> {
    let index: HashMap<&str, usize> = stages
        .iter()
        .enumerate()
        .map(|(idx, stage)| (stage.name.as_str(), idx))
        .collect();

    let mut indegree = vec![0usize; stages.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];

    for (idx, stage) in stages.iter().enumerate() {
        for need in &stage.needs {
            let parent = *index.get(need.as_str()).ok_or_else(|| {
                ContractError::plan_load(
                    format!("stages[{}].needs", stage.name),
                    format!("depends on unknown stage '{need}'"),
                )
            })?;
            indegree[idx] += 1;
            dependents[parent].push(idx);
        }
    }

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(idx, _)| idx)
        .collect();

    let mut ordered = Vec::with_capacity(stages.len());
    while let Some(idx) = ready.pop_first() {
        ordered.push(stages[idx].clone());
        for &child in &dependents[idx] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if ordered.len() != stages.len() {
        let pending: Vec<&str> = stages
            .iter()
            .enumerate()
            .filter(|(idx, _)| indegree[*idx] > 0)
            .map(|(_, stage)| stage.name.as_str())
            .collect();
        return Err(ContractError::plan_load(
            "stages.needs",
            format!("stages contain a dependency cycle: {}", pending.join(", ")),
        ));
    }

    Ok(ordered)
}
