//! Local Deploy Example
//!
//! Runs `local.toml` through the local shell inside a scratch directory and
//! appends the deploy log to `deploy.log` there.
//!
//! Run with: cargo run -p deploy_demos --bin local_deploy

use std::sync::Arc;

use engine::{cancellation, Engine, EngineConfig, FileSink, TracingSink};
use plan_loader::{PlanFormat, PlanLoader};
use transport::{EnvSecretProvider, RetryPolicy, ShellConnector};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let plan = PlanLoader::load_from_str(include_str!("local.toml"), PlanFormat::Toml)?;

    // Source tree: a scratch directory holding the files the plan transfers
    let source = std::env::temp_dir().join(format!("deploy-demo-{}", std::process::id()));
    std::fs::create_dir_all(&source)?;
    std::fs::write(source.join("deploy.toml"), include_str!("deploy.toml"))?;
    tracing::info!(source = %source.display(), "Source prepared");

    let engine = Engine::builder(ShellConnector::new(&source, RetryPolicy::no_retry()))
        .secrets(Arc::new(EnvSecretProvider::new()))
        .config(EngineConfig::from_settings(&plan.settings))
        .log_sink(TracingSink::new("tracing"))
        .log_sink(FileSink::open("file", source.join("deploy.log")).await?)
        .build();

    let (_cancel, token) = cancellation();
    let report = engine.run(&plan, &plan.targets, token).await?;
    engine.shutdown().await;

    let summary = report.summary();
    println!(
        "\n{:?}: {} succeeded, {} rolled back, {} failed",
        report.status, summary.succeeded, summary.rolled_back, summary.failed
    );
    println!(
        "state file: {}",
        std::fs::read_to_string(source.join(".deploy-demo/state"))?.trim()
    );
    println!("deploy log:\n{}", std::fs::read_to_string(source.join("deploy.log"))?);

    Ok(())
}
