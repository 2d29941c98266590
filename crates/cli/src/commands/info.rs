//! `info` command implementation.

use anyhow::Context;
use contracts::{Command, Plan, SourceSpec, TargetSelector, TransportKind};
use plan_loader::PlanLoader;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::Result;
use crate::report::policy_label;

/// Plan info for JSON output
#[derive(Serialize)]
struct PlanInfo {
    name: String,
    settings: SettingsInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    targets: Vec<TargetInfo>,
    stages: Vec<StageInfo>,
}

#[derive(Serialize)]
struct SettingsInfo {
    parallelism: usize,
    transport_retries: u32,
    retry_backoff_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    command_timeout_secs: Option<u64>,
}

#[derive(Serialize)]
struct TargetInfo {
    name: String,
    transport: String,
    destination: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

#[derive(Serialize)]
struct StageInfo {
    name: String,
    on_failure: &'static str,
    cleanup: bool,
    targets: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    needs: Vec<String>,
    command_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    commands: Vec<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(plan = %args.plan.display(), "Loading plan info");

    let plan = PlanLoader::load_from_path(&args.plan)?;

    if args.json {
        let info = build_plan_info(&plan, args);
        let json = serde_json::to_string_pretty(&info).context("Failed to serialize plan info")?;
        println!("{json}");
    } else {
        print_plan_info(&plan, args);
    }

    Ok(())
}

fn describe_source(source: &SourceSpec) -> String {
    match source {
        SourceSpec::Git {
            repository,
            reference,
        } => format!("git {repository} @ {reference}"),
        SourceSpec::Local { path } => format!("local {path}"),
    }
}

fn describe_selector(selector: &TargetSelector) -> String {
    match selector {
        TargetSelector::All => "all".to_string(),
        TargetSelector::Names(names) => names.join(", "),
        TargetSelector::Tag { tag } => format!("tag:{tag}"),
    }
}

fn transport_label(kind: TransportKind) -> &'static str {
    match kind {
        TransportKind::Local => "local",
        TransportKind::Ssh => "ssh",
    }
}

fn build_plan_info(plan: &Plan, args: &InfoArgs) -> PlanInfo {
    PlanInfo {
        name: plan.name.clone(),
        settings: SettingsInfo {
            parallelism: plan.settings.parallelism,
            transport_retries: plan.settings.transport_retries,
            retry_backoff_ms: plan.settings.retry_backoff_ms,
            command_timeout_secs: plan.settings.command_timeout_secs,
        },
        source: plan.source.as_ref().map(describe_source),
        targets: plan
            .targets
            .iter()
            .map(|t| TargetInfo {
                name: t.name.clone(),
                transport: transport_label(t.transport).to_string(),
                destination: t.destination(),
                tags: t.tags.clone(),
            })
            .collect(),
        stages: plan
            .stages
            .iter()
            .map(|s| StageInfo {
                name: s.name.clone(),
                on_failure: policy_label(s.on_failure),
                cleanup: s.cleanup,
                targets: describe_selector(&s.targets),
                needs: s.needs.clone(),
                command_count: s.commands.len(),
                commands: if args.commands {
                    s.commands.iter().map(Command::describe).collect()
                } else {
                    Vec::new()
                },
            })
            .collect(),
    }
}

fn print_plan_info(plan: &Plan, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                      Deployment Plan                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📋 {}", plan.name);
    println!("   ├─ Parallelism: {}", plan.settings.parallelism);
    println!(
        "   ├─ Connect retries: {} ({} ms backoff)",
        plan.settings.transport_retries, plan.settings.retry_backoff_ms
    );
    match &plan.source {
        Some(source) => println!("   └─ Source: {}", describe_source(source)),
        None => println!("   └─ Source: plan directory"),
    }

    println!("\n🖥  Targets ({})", plan.targets.len());
    for (i, target) in plan.targets.iter().enumerate() {
        let prefix = if i == plan.targets.len() - 1 { "└─" } else { "├─" };
        println!(
            "   {} {} ({} {})",
            prefix,
            target.name,
            transport_label(target.transport),
            target.destination()
        );
    }

    println!("\n⚙️  Stages ({})", plan.stages.len());
    for (i, stage) in plan.stages.iter().enumerate() {
        let is_last = i == plan.stages.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };
        let cleanup = if stage.cleanup { ", cleanup" } else { "" };

        println!(
            "   {} {} ({}{}, targets: {})",
            prefix,
            stage.name,
            policy_label(stage.on_failure),
            cleanup,
            describe_selector(&stage.targets)
        );
        if !stage.needs.is_empty() {
            println!("   {}  needs: {}", child_prefix, stage.needs.join(", "));
        }
        if args.commands {
            for command in &stage.commands {
                println!("   {}  $ {}", child_prefix, command.describe());
            }
        } else {
            println!("   {}  {} commands", child_prefix, stage.commands.len());
        }
    }

    println!();
}
