//! # Plan Loader
//!
//! Deployment plan loading and validation.
//!
//! Responsibilities:
//! - Parse TOML / JSON / YAML plan files (one thin adapter per format)
//! - Validate plan legality (duplicate names, unknown references, cycles)
//! - Produce an immutable `Plan` with stages in execution order
//!
//! Loading has no side effects beyond reading the plan file.
//!
//! # Example
//!
//! ```no_run
//! use plan_loader::PlanLoader;
//! use std::path::Path;
//!
//! let plan = PlanLoader::load_from_path(Path::new("deploy.toml")).unwrap();
//! println!("Stages: {}", plan.stages.len());
//! ```

mod order;
mod parser;
mod validator;

pub use contracts::Plan;
pub use order::order_stages;
pub use parser::PlanFormat;
pub use validator::warnings;

use contracts::ContractError;
use std::path::Path;
use tracing::debug;

/// Plan loader
///
/// Provides static methods to load plans from files or strings.
pub struct PlanLoader;

impl PlanLoader {
    /// Load plan from file path
    ///
    /// Detects format from file extension (.toml / .json / .yaml / .yml).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<Plan, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        debug!(path = %path.display(), ?format, "loading plan");
        Self::load_from_str(&content, format)
    }

    /// Load plan from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(content: &str, format: PlanFormat) -> Result<Plan, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Serialize Plan to TOML string
    pub fn to_toml(plan: &Plan) -> Result<String, ContractError> {
        toml::to_string_pretty(plan)
            .map_err(|e| ContractError::plan_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize Plan to JSON string
    pub fn to_json(plan: &Plan) -> Result<String, ContractError> {
        serde_json::to_string_pretty(plan)
            .map_err(|e| ContractError::plan_parse(format!("JSON serialize error: {e}")))
    }
}

impl PlanLoader {
    /// Infer plan format from file extension
    fn detect_format(path: &Path) -> Result<PlanFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::plan_parse("cannot determine file format from extension")
        })?;

        PlanFormat::from_extension(ext)
            .ok_or_else(|| ContractError::plan_parse(format!("unsupported plan format: .{ext}")))
    }

    /// Read plan file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        std::fs::read_to_string(path).map_err(|e| ContractError::PlanParse {
            message: format!("cannot read {}: {e}", path.display()),
            source: Some(Box::new(e)),
        })
    }

    /// Parse, validate and order
    fn parse_and_validate(content: &str, format: PlanFormat) -> Result<Plan, ContractError> {
        let mut plan = parser::parse(content, format)?;
        validator::validate(&plan)?;
        plan.stages = order::order_stages(&plan.stages)?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE_WORKFLOW_TOML: &str = r#"
name = "production"

[settings]
parallelism = 2

[source]
repository = "https://example.com/acme/app.git"
ref = "production"

[variables]
APP_DIR = "/srv/app"

[[targets]]
name = "web-1"
host = "203.0.113.10"
user = "deploy"
credential = "DEPLOY_SSH_KEY"

[[stages]]
name = "prune-before"
cleanup = true
commands = ["docker system prune -f"]

[[stages]]
name = "upload"
commands = [{ transfer = { local = "docker-compose.yml", remote = "/srv/app/docker-compose.yml" } }]

[[stages]]
name = "build"
commands = ["cd ${APP_DIR} && docker compose build ${NO_CACHE}"]

[[stages]]
name = "restart"
commands = ["cd ${APP_DIR} && docker compose down", "cd ${APP_DIR} && docker compose up -d"]
on_failure = "rollback-to-previous"
rollback = ["cd ${APP_DIR} && docker compose up -d --no-build"]

[[stages]]
name = "cleanup"
cleanup = true
commands = ["rm -f ${APP_DIR}/.env", "docker system prune -f"]
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = PlanLoader::load_from_str(SOURCE_WORKFLOW_TOML, PlanFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let plan = result.unwrap();
        assert_eq!(plan.name, "production");
        assert_eq!(plan.settings.parallelism, 2);
        assert_eq!(plan.stages.len(), 5);
        assert_eq!(plan.cleanup_stages().count(), 2);
        assert!(matches!(
            plan.source,
            Some(contracts::SourceSpec::Git { ref reference, .. }) if reference == "production"
        ));
    }

    #[test]
    fn test_round_trip_json() {
        let plan = PlanLoader::load_from_str(SOURCE_WORKFLOW_TOML, PlanFormat::Toml).unwrap();
        let json = PlanLoader::to_json(&plan).unwrap();
        let plan2 = PlanLoader::load_from_str(&json, PlanFormat::Json).unwrap();
        assert_eq!(plan, plan2);
    }

    #[test]
    fn test_duplicate_stage_rejected_after_parse() {
        let content = r#"
[[targets]]
name = "web-1"
host = "h"

[[stages]]
name = "build"
commands = ["make"]

[[stages]]
name = "build"
commands = ["make install"]
"#;
        let err = PlanLoader::load_from_str(content, PlanFormat::Toml).unwrap_err();
        assert!(matches!(err, ContractError::PlanLoad { .. }));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_cycle_rejected() {
        let content = r#"
[[stages]]
name = "a"
needs = ["b"]
commands = ["true"]

[[stages]]
name = "b"
needs = ["a"]
commands = ["true"]
"#;
        let err = PlanLoader::load_from_str(content, PlanFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_needs_reorders_stages() {
        let content = r#"
[[stages]]
name = "up"
needs = ["build"]
commands = ["docker compose up -d"]

[[stages]]
name = "build"
commands = ["docker compose build"]
"#;
        let plan = PlanLoader::load_from_str(content, PlanFormat::Toml).unwrap();
        assert_eq!(plan.stages[0].name, "build");
        assert_eq!(plan.stages[1].name, "up");
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.toml");
        std::fs::write(&path, SOURCE_WORKFLOW_TOML).unwrap();

        let plan = PlanLoader::load_from_path(&path).unwrap();
        assert_eq!(plan.name, "production");

        let bad = dir.path().join("deploy.ini");
        std::fs::write(&bad, "x").unwrap();
        let err = PlanLoader::load_from_path(&bad).unwrap_err();
        assert!(err.to_string().contains("unsupported plan format"));
    }
}
