//! Mock Deploy Example
//!
//! Runs `deploy.toml` against in-memory targets. `web-2` fails to start its
//! containers, which triggers the `up` rollback and still runs the `prune`
//! cleanup stage. No hosts or credentials are needed.
//!
//! Run with: cargo run -p deploy_demos --bin mock_deploy [plan.toml]

use std::sync::Arc;
use std::time::Duration;

use engine::{cancellation, Engine, EngineConfig, MemorySink, TracingSink};
use observability::DeployMetricsAggregator;
use plan_loader::{PlanFormat, PlanLoader};
use transport::{MockConfig, MockConnector, StaticSecretProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting Mock Deploy Demo");

    // ==== Stage 1: Load plan ====
    let plan = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!(path = %path, "Loading plan");
            PlanLoader::load_from_path(std::path::Path::new(&path))?
        }
        None => PlanLoader::load_from_str(include_str!("deploy.toml"), PlanFormat::Toml)?,
    };

    // ==== Stage 2: Mock targets ====
    let connector = MockConnector::with_config(
        MockConfig::default()
            .flaky_connect("web-1", 1)
            .fail_command("web-2", "docker compose up -d")
            .with_delay(Duration::from_millis(150)),
    );
    let secrets = StaticSecretProvider::new().with("DEPLOY_SSH_KEY", "/dev/null");

    // ==== Stage 3: Engine ====
    let memory = MemorySink::new("memory");
    let engine = Engine::builder(connector.clone())
        .secrets(Arc::new(secrets))
        .config(
            EngineConfig::from_settings(&plan.settings)
                .with_connect_retry(transport::RetryPolicy::new(3, Duration::from_millis(200)))
                .with_variable("NO_CACHE", "--no-cache"),
        )
        .log_sink(TracingSink::new("tracing"))
        .log_sink(memory.clone())
        .build();

    // ==== Stage 4: Run ====
    let (_cancel, token) = cancellation();
    let report = engine.run(&plan, &plan.targets, token).await?;
    engine.shutdown().await;

    // ==== Stage 5: Report ====
    println!("\n=== Deploy log ===");
    for line in memory.lines() {
        println!("{line}");
    }

    println!("\n=== Results ===");
    for result in &report.results {
        println!(
            "{:<8} {:<10} {:?}{}",
            result.target,
            result.stage,
            result.status,
            if result.cleanup { " (cleanup)" } else { "" }
        );
    }

    println!("\n{}", DeployMetricsAggregator::from_results(&report.results).summary());
    println!(
        "Run status: {:?} (web-1 connect attempts: {})",
        report.status,
        connector.connect_attempts("web-1")
    );

    Ok(())
}
