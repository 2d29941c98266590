//! Plan parsing
//!
//! One thin adapter per text format. Each adapter only turns text into a
//! `Plan`; semantic checks live in the validator.

use contracts::{ContractError, Plan};

/// Plan file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
    /// YAML
    Yaml,
}

impl PlanFormat {
    /// Infer format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Parse TOML plan
pub fn parse_toml(content: &str) -> Result<Plan, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::PlanParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON plan
pub fn parse_json(content: &str) -> Result<Plan, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::PlanParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse YAML plan
pub fn parse_yaml(content: &str) -> Result<Plan, ContractError> {
    serde_yml::from_str(content).map_err(|e| ContractError::PlanParse {
        message: format!("YAML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse according to format
pub fn parse(content: &str, format: PlanFormat) -> Result<Plan, ContractError> {
    match format {
        PlanFormat::Toml => parse_toml(content),
        PlanFormat::Json => parse_json(content),
        PlanFormat::Yaml => parse_yaml(content),
    }
}
