//! Error types for CLI operations.

use contracts::{ContractError, ErrorKind};
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Plan file could not be parsed or validated
    #[error(transparent)]
    Plan(ContractError),

    /// `--target` names a target the plan does not declare
    #[error("unknown target '{name}' (declared: {declared})")]
    UnknownTarget { name: String, declared: String },

    /// Source tree could not be prepared
    #[error(transparent)]
    Source(ContractError),

    /// At least one stage failed on some target
    #[error("deployment failed: {failed} of {total} stage results did not succeed")]
    Execution { failed: usize, total: usize },

    /// At least one target was unreachable
    #[error("deployment failed: {unreachable} target(s) unreachable")]
    Transport { unreachable: usize },

    /// Interrupted by SIGINT / SIGTERM
    #[error("deployment cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn unknown_target(name: impl Into<String>, declared: &[String]) -> Self {
        Self::UnknownTarget {
            name: name.into(),
            declared: declared.join(", "),
        }
    }

    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Plan(_) | Self::UnknownTarget { .. } => 2,
            Self::Execution { .. } => 3,
            Self::Transport { .. } => 4,
            Self::Cancelled => 130,
            Self::Source(_) | Self::Io(_) | Self::Other(_) => 1,
        }
    }
}

impl From<ContractError> for CliError {
    fn from(err: ContractError) -> Self {
        match err.kind() {
            ErrorKind::PlanLoad => Self::Plan(err),
            ErrorKind::Cancellation => Self::Cancelled,
            _ => Self::Source(err),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
