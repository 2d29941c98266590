//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// deploy - declarative multi-target deployment runner
#[derive(Parser, Debug)]
#[command(
    name = "deploy",
    author,
    version,
    about = "Run declarative deployment plans against one or more hosts",
    long_about = "Runs a deployment plan: ordered stages of shell commands and file transfers,\n\
                  executed per target over the local shell or ssh, with per-stage failure\n\
                  policies, rollback and cleanup stages."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "DEPLOY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "DEPLOY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a deployment plan
    Run(RunArgs),

    /// Validate a plan file without running it
    Validate(ValidateArgs),

    /// Display plan information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to the plan file (TOML, JSON or YAML)
    #[arg(env = "DEPLOY_PLAN")]
    pub plan: PathBuf,

    /// Target to deploy to, repeatable (default: every declared target)
    #[arg(
        short,
        long = "target",
        value_name = "NAME",
        env = "DEPLOY_TARGETS",
        value_delimiter = ','
    )]
    pub targets: Vec<String>,

    /// Print the execution schedule without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Set NO_CACHE=--no-cache for image builds
    #[arg(long, env = "DEPLOY_NO_CACHE")]
    pub no_cache: bool,

    /// Maximum targets running concurrently (overrides the plan)
    #[arg(short, long, env = "DEPLOY_PARALLELISM")]
    pub parallelism: Option<usize>,

    /// Source ref to check out (overrides the plan)
    #[arg(long = "ref", value_name = "REF", env = "DEPLOY_REF")]
    pub reference: Option<String>,

    /// Extra variable for command templates, repeatable
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_variable)]
    pub variables: Vec<(String, String)>,

    /// Directory used for source checkouts
    #[arg(long, default_value = ".deploy", env = "DEPLOY_WORKDIR")]
    pub workdir: PathBuf,

    /// Append the deploy log to this file
    #[arg(long, env = "DEPLOY_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Prefix for credential environment variables
    #[arg(long, env = "DEPLOY_SECRET_PREFIX")]
    pub secret_prefix: Option<String>,

    /// ssh client used for ssh targets
    #[arg(long, default_value = "ssh", env = "DEPLOY_SSH_PROGRAM")]
    pub ssh_program: PathBuf,

    /// scp client used for transfers to ssh targets
    #[arg(long, default_value = "scp", env = "DEPLOY_SCP_PROGRAM")]
    pub scp_program: PathBuf,

    /// Print the execution report as JSON
    #[arg(long)]
    pub json: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "DEPLOY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the plan file to validate
    pub plan: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to the plan file
    pub plan: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show stage commands
    #[arg(long)]
    pub commands: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}
