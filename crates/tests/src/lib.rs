//! # Integration Tests
//!
//! End-to-end runs across crates.
//!
//! - Plan text -> PlanLoader -> Engine -> ExecutionReport
//! - Mock transport runs (no hosts needed)
//! - Local shell runs against a temp directory
//! - ssh targets through a scripted client

#[cfg(test)]
mod plan_tests {
    use contracts::ErrorKind;
    use plan_loader::{PlanFormat, PlanLoader};

    #[test]
    fn test_duplicate_stage_name_is_plan_load_error() {
        let toml = r#"
[[targets]]
name = "web-1"
host = "10.0.0.1"

[[stages]]
name = "build"
commands = ["docker compose build"]

[[stages]]
name = "build"
commands = ["docker compose up -d"]
"#;
        let err = PlanLoader::load_from_str(toml, PlanFormat::Toml).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PlanLoad);
    }

    #[test]
    fn test_yaml_and_toml_agree() {
        let toml = r#"
name = "web"

[[targets]]
name = "web-1"
host = "10.0.0.1"

[[stages]]
name = "build"
commands = ["docker compose build ${NO_CACHE}"]
on_failure = "rollback-to-previous"
rollback = ["docker compose down"]
"#;
        let yaml = r#"
name: web
targets:
  - name: web-1
    host: 10.0.0.1
stages:
  - name: build
    commands: ["docker compose build ${NO_CACHE}"]
    on_failure: rollback-to-previous
    rollback: ["docker compose down"]
"#;
        let from_toml = PlanLoader::load_from_str(toml, PlanFormat::Toml).unwrap();
        let from_yaml = PlanLoader::load_from_str(yaml, PlanFormat::Yaml).unwrap();
        assert_eq!(from_toml, from_yaml);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{ErrorKind, ExecutionReport, Plan, RunStatus, StageStatus, Target};
    use engine::{cancellation, Engine, EngineConfig, MemorySink};
    use plan_loader::{PlanFormat, PlanLoader};
    use transport::{MockConfig, MockConnector, RetryPolicy, StaticSecretProvider};

    /// checkout, build, down, up, prune against one or more hosts
    const WEB_PLAN: &str = r#"
name = "web"

[settings]
parallelism = 4
transport_retries = 2
retry_backoff_ms = 10

[[targets]]
name = "web-1"
host = "10.0.0.1"

[[targets]]
name = "web-2"
host = "10.0.0.2"

[[targets]]
name = "web-3"
host = "10.0.0.3"

[[stages]]
name = "checkout"
commands = ["git fetch origin", "git checkout main"]

[[stages]]
name = "build"
commands = ["docker compose build ${NO_CACHE}"]

[[stages]]
name = "down"
commands = ["docker compose down"]

[[stages]]
name = "up"
commands = ["docker compose up -d"]

[[stages]]
name = "prune"
commands = ["docker system prune -f"]
"#;

    fn plan(text: &str) -> Plan {
        PlanLoader::load_from_str(text, PlanFormat::Toml).unwrap()
    }

    fn engine(plan: &Plan, connector: MockConnector, sink: &MemorySink) -> Engine<MockConnector> {
        Engine::builder(connector)
            .secrets(Arc::new(StaticSecretProvider::new()))
            .config(
                EngineConfig::from_settings(&plan.settings).with_variable("NO_CACHE", "--no-cache"),
            )
            .log_sink(sink.clone())
            .build()
    }

    async fn run(
        plan: &Plan,
        targets: &[Target],
        connector: MockConnector,
    ) -> (ExecutionReport, Vec<String>) {
        let sink = MemorySink::new("memory");
        let engine = engine(plan, connector, &sink);
        let (_handle, token) = cancellation();
        let report = engine.run(plan, targets, token).await.unwrap();
        engine.shutdown().await;
        (report, sink.lines())
    }

    fn stages_for(report: &ExecutionReport, target: &str) -> Vec<String> {
        report.results_for(target).map(|r| r.stage.clone()).collect()
    }

    /// Every (stage, target) pair reports exactly once, in stage order per target
    #[tokio::test]
    async fn test_successful_run_reports_every_pair() {
        let plan = plan(WEB_PLAN);
        let connector = MockConnector::new();
        let (report, lines) = run(&plan, &plan.targets, connector.clone()).await;

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.results.len(), 5 * 3);
        for target in ["web-1", "web-2", "web-3"] {
            assert_eq!(
                stages_for(&report, target),
                vec!["checkout", "build", "down", "up", "prune"]
            );
        }
        // One log line per command
        assert_eq!(lines.len(), 6 * 3);
        assert!(connector
            .commands_for("web-1")
            .contains(&"docker compose build --no-cache".to_string()));
    }

    /// Aborting a target drops its later stages from the report
    #[tokio::test]
    async fn test_abort_keeps_only_stages_up_to_failure() {
        let plan = plan(WEB_PLAN);
        let targets = vec![plan.targets[0].clone()];
        let connector = MockConnector::with_config(
            MockConfig::default().fail_command("web-1", "compose build"),
        );
        let (report, _) = run(&plan, &targets, connector.clone()).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.result("checkout", "web-1").unwrap().status, StageStatus::Success);
        let build = report.result("build", "web-1").unwrap();
        assert_eq!(build.status, StageStatus::Failed);
        assert_eq!(build.failure, Some(ErrorKind::Command));
        assert_eq!(build.exit_code, Some(1));

        for absent in ["down", "up", "prune"] {
            assert!(report.result(absent, "web-1").is_none());
        }
        assert!(!connector.commands_for("web-1").iter().any(|c| c.contains("compose up")));
        assert_eq!(report.failure_kind(), Some(ErrorKind::Command));
    }

    /// A cleanup stage runs once per target even after an abort
    #[tokio::test]
    async fn test_cleanup_runs_once_after_failure() {
        let plan = plan(&WEB_PLAN.replace(
            "name = \"prune\"\n",
            "name = \"prune\"\ncleanup = true\n",
        ));
        let connector = MockConnector::with_config(
            MockConfig::default().fail_command("web-2", "compose build"),
        );
        let (report, lines) = run(&plan, &plan.targets, connector.clone()).await;

        assert_eq!(stages_for(&report, "web-2"), vec!["checkout", "build", "prune"]);
        let prune = report.result("prune", "web-2").unwrap();
        assert!(prune.cleanup);
        assert_eq!(prune.status, StageStatus::Success);

        let prunes = connector
            .commands_for("web-2")
            .into_iter()
            .filter(|c| c.contains("system prune"))
            .count();
        assert_eq!(prunes, 1);

        let prune_lines: Vec<&String> = lines
            .iter()
            .filter(|l| l.contains(" web-2 prune 0 "))
            .collect();
        assert_eq!(prune_lines.len(), 1);

        // Other targets are unaffected
        assert_eq!(report.results_for("web-1").count(), 5);
        assert_eq!(report.results_for("web-3").count(), 5);
    }

    /// An unreachable target fails on its own while the rest complete
    #[tokio::test(start_paused = true)]
    async fn test_unreachable_target_is_isolated() {
        let plan = plan(WEB_PLAN);
        let connector = MockConnector::with_config(MockConfig::default().fail_connect("web-3"));
        let (report, _) = run(&plan, &plan.targets, connector.clone()).await;

        assert_eq!(report.failure_kind(), Some(ErrorKind::Transport));
        assert_eq!(report.results_for("web-1").count(), 5);
        let checkout = report.result("checkout", "web-3").unwrap();
        assert_eq!(checkout.failure, Some(ErrorKind::Transport));
        assert_eq!(report.results_for("web-3").count(), 1);
        assert_eq!(connector.connect_attempts("web-3"), 2);
    }

    /// With parallelism 2, five one-second targets take three seconds
    #[tokio::test(start_paused = true)]
    async fn test_parallelism_bounds_stage_wall_time() {
        let targets: Vec<Target> = (1..=5).map(|i| Target::local(format!("web-{i}"))).collect();
        let mut plan = Plan::new(
            "bounded",
            targets.clone(),
            vec![contracts::Stage::new("up", ["docker compose up -d"])],
        );
        plan.settings.parallelism = 2;

        let connector =
            MockConnector::with_config(MockConfig::default().with_delay(Duration::from_secs(1)));
        let clock = tokio::time::Instant::now();
        let (report, _) = run(&plan, &targets, connector).await;
        let elapsed = clock.elapsed();

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.results.len(), 5);
        assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
    }

    /// Flaky connections recover within the retry bound
    #[tokio::test(start_paused = true)]
    async fn test_flaky_target_recovers() {
        let plan = plan(WEB_PLAN);
        let targets = vec![plan.targets[1].clone()];
        let connector = MockConnector::with_config(MockConfig::default().flaky_connect("web-2", 1));
        let sink = MemorySink::new("memory");
        let engine = Engine::builder(connector.clone())
            .secrets(Arc::new(StaticSecretProvider::new()))
            .config(
                EngineConfig::from_settings(&plan.settings)
                    .with_connect_retry(RetryPolicy::new(2, Duration::from_millis(50))),
            )
            .log_sink(sink.clone())
            .build();

        let (_handle, token) = cancellation();
        let report = engine.run(&plan, &targets, token).await.unwrap();
        engine.shutdown().await;

        assert!(report.is_success());
        assert_eq!(connector.connect_attempts("web-2"), 2);
    }
}

#[cfg(test)]
mod local_shell_tests {
    use std::sync::Arc;

    use contracts::{RunStatus, StageStatus, Target};
    use engine::{cancellation, Engine, EngineConfig, FileSink};
    use plan_loader::{PlanFormat, PlanLoader};
    use transport::{RetryPolicy, ShellConnector, StaticSecretProvider};

    /// Real commands through `sh`, with a rollback and a log file
    #[tokio::test]
    async fn test_local_deploy_with_rollback() {
        let source = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("app.conf"), "port=8080\n").unwrap();
        let log_path = source.path().join("logs/deploy.log");

        let plan = PlanLoader::load_from_str(
            r#"
name = "local"

[[targets]]
name = "localhost"
transport = "local"

[[stages]]
name = "stage-files"
commands = [
    "mkdir -p release",
    { transfer = { local = "app.conf", remote = "release/app.conf" } },
]

[[stages]]
name = "switch"
on_failure = "rollback-to-previous"
commands = ["echo live > release/state", "exit 3"]
rollback = ["echo previous > release/state"]

[[stages]]
name = "never"
commands = ["touch release/never"]

[[stages]]
name = "tidy"
cleanup = true
commands = ["rm -f release/tmp"]
"#,
            PlanFormat::Toml,
        )
        .unwrap();

        let engine = Engine::builder(ShellConnector::new(source.path(), RetryPolicy::no_retry()))
            .secrets(Arc::new(StaticSecretProvider::new()))
            .config(EngineConfig::from_settings(&plan.settings))
            .log_sink(FileSink::open("file", &log_path).await.unwrap())
            .build();

        let targets = vec![Target::local("localhost")];
        let (_handle, token) = cancellation();
        let report = engine.run(&plan, &targets, token).await.unwrap();
        engine.shutdown().await;

        assert_eq!(report.status, RunStatus::Failed);
        let switch = report.result("switch", "localhost").unwrap();
        assert_eq!(switch.status, StageStatus::RolledBack);
        assert_eq!(switch.exit_code, Some(3));
        assert_eq!(switch.commands.last().unwrap().exit_code, Some(0));
        assert!(report.result("never", "localhost").is_none());
        assert!(report.result("tidy", "localhost").unwrap().succeeded());

        let release = source.path().join("release");
        assert_eq!(std::fs::read_to_string(release.join("app.conf")).unwrap(), "port=8080\n");
        assert_eq!(std::fs::read_to_string(release.join("state")).unwrap(), "previous\n");
        assert!(!release.join("never").exists());

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(log.contains(" localhost switch 3 "));
        assert!(log.contains(" localhost switch/rollback 0 "));
        assert_eq!(log.lines().count(), 6);
    }
}

#[cfg(all(test, unix))]
mod ssh_tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{ErrorKind, FailurePolicy, Plan, Stage, StageStatus, Target};
    use engine::{cancellation, Engine, EngineConfig, MemorySink};
    use transport::{RetryPolicy, ShellConnector, SshPrograms, StaticSecretProvider};

    /// Stand-in `ssh` client: logs the remote command, then runs `body`
    fn fake_ssh(dir: &Path, body: &str) -> (PathBuf, PathBuf) {
        let script = dir.join("ssh");
        let log = dir.join("remote.log");
        let content = format!(
            "#!/bin/sh\nfor last; do :; done\nprintf '%s\\n' \"$last\" >> '{}'\n{body}\n",
            log.display()
        );
        std::fs::write(&script, content).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    fn remote_commands(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    fn engine(dir: &Path, ssh: PathBuf, retry: RetryPolicy) -> Engine<ShellConnector> {
        let connector = ShellConnector::new(dir, retry).with_ssh_programs(SshPrograms {
            ssh,
            scp: PathBuf::from("scp"),
        });
        Engine::builder(connector)
            .secrets(Arc::new(StaticSecretProvider::new()))
            .config(EngineConfig::default().with_connect_retry(retry))
            .log_sink(MemorySink::new("memory"))
            .build()
    }

    /// Failing remote commands follow the stage policy, even when their
    /// output mentions refused connections
    #[tokio::test]
    async fn test_remote_command_failure_follows_stage_policy() {
        let dir = tempfile::tempdir().unwrap();
        let (ssh, log) = fake_ssh(
            dir.path(),
            r#"case "$last" in
  true) exit 0 ;;
  curl*) echo 'curl: (7) Failed to connect: Connection refused' >&2; exit 7 ;;
  switch-release) echo 'release directory missing' >&2; exit 2 ;;
  *) exit 0 ;;
esac"#,
        );
        let retry = RetryPolicy::new(3, Duration::from_millis(10));
        let engine = engine(dir.path(), ssh, retry);

        let plan = Plan::new(
            "ssh",
            vec![Target::ssh("web-1", "203.0.113.10")],
            vec![
                Stage::new("smoke", ["curl -fsS http://localhost:8080/health"])
                    .with_policy(FailurePolicy::Continue),
                Stage::new("after", ["docker compose ps"]),
                Stage::new("switch", ["switch-release"])
                    .with_policy(FailurePolicy::RollbackToPrevious)
                    .with_rollback(["restore-release"]),
                Stage::new("never", ["docker compose up -d"]),
            ],
        );

        let (_handle, token) = cancellation();
        let report = engine.run(&plan, &plan.targets, token).await.unwrap();
        engine.shutdown().await;

        let smoke = report.result("smoke", "web-1").unwrap();
        assert_eq!(smoke.status, StageStatus::Failed);
        assert_eq!(smoke.failure, Some(ErrorKind::Command));
        assert_eq!(smoke.exit_code, Some(7));
        assert!(report.result("after", "web-1").unwrap().succeeded());

        let switch = report.result("switch", "web-1").unwrap();
        assert_eq!(switch.status, StageStatus::RolledBack);
        assert_eq!(switch.exit_code, Some(2));
        assert!(report.result("never", "web-1").is_none());
        assert_eq!(report.failure_kind(), Some(ErrorKind::Command));

        // One connection check, every remote command run exactly once
        assert_eq!(
            remote_commands(&log),
            vec![
                "true",
                "curl -fsS http://localhost:8080/health",
                "docker compose ps",
                "switch-release",
                "restore-release",
            ]
        );
    }

    /// The client's own connection errors are transport failures, retried
    /// within the bound
    #[tokio::test]
    async fn test_unreachable_ssh_host_is_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (ssh, log) = fake_ssh(
            dir.path(),
            "echo 'ssh: connect to host 203.0.113.10 port 22: Connection refused' >&2\nexit 255",
        );
        let retry = RetryPolicy::new(2, Duration::from_millis(10));
        let engine = engine(dir.path(), ssh, retry);

        let plan = Plan::new(
            "ssh",
            vec![Target::ssh("web-1", "203.0.113.10")],
            vec![
                Stage::new("up", ["docker compose up -d"]),
                Stage::new("later", ["docker compose ps"]),
            ],
        );

        let (_handle, token) = cancellation();
        let report = engine.run(&plan, &plan.targets, token).await.unwrap();
        engine.shutdown().await;

        let up = report.result("up", "web-1").unwrap();
        assert_eq!(up.status, StageStatus::Failed);
        assert_eq!(up.failure, Some(ErrorKind::Transport));
        assert!(report.result("later", "web-1").is_none());
        assert_eq!(report.failure_kind(), Some(ErrorKind::Transport));
        assert_eq!(remote_commands(&log), vec!["true", "true"]);
    }
}
