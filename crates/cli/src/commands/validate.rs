//! `validate` command implementation.

use anyhow::Context;
use contracts::ContractError;
use plan_loader::PlanLoader;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;
use crate::error::{CliError, Result};

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    plan_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<PlanSummary>,
}

#[derive(Serialize)]
struct PlanSummary {
    name: String,
    target_count: usize,
    stage_count: usize,
    cleanup_stage_count: usize,
    /// Stage names in execution order
    order: Vec<String>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(plan = %args.plan.display(), "Validating plan");

    let (result, failure) = validate_plan(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    match failure {
        Some(err) => Err(CliError::Plan(err)),
        None => Ok(()),
    }
}

fn validate_plan(args: &ValidateArgs) -> (ValidationResult, Option<ContractError>) {
    let plan_path = args.plan.display().to_string();

    match PlanLoader::load_from_path(&args.plan) {
        Ok(plan) => {
            let result = ValidationResult {
                valid: true,
                plan_path,
                error: None,
                warnings: plan_loader::warnings(&plan),
                summary: Some(PlanSummary {
                    name: plan.name.clone(),
                    target_count: plan.targets.len(),
                    stage_count: plan.stages.len(),
                    cleanup_stage_count: plan.cleanup_stages().count(),
                    order: plan.stages.iter().map(|s| s.name.clone()).collect(),
                }),
            };
            (result, None)
        }
        Err(e) => {
            let result = ValidationResult {
                valid: false,
                plan_path,
                error: Some(e.to_string()),
                warnings: Vec::new(),
                summary: None,
            };
            (result, Some(e))
        }
    }
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Plan is valid: {}", result.plan_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Name: {}", summary.name);
            println!("  Targets: {}", summary.target_count);
            println!(
                "  Stages: {} ({} cleanup)",
                summary.stage_count, summary.cleanup_stage_count
            );
            println!("  Order: {}", summary.order.join(" → "));
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {warning}");
            }
        }
    } else {
        println!("✗ Plan is invalid: {}", result.plan_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {error}");
        }
    }
}
