//! Command-line argument definitions.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

/// Plan, apply and inspect layered infrastructure.
#[derive(Debug, Parser)]
#[command(name = "stratum", about, version)]
pub struct CommandLine {
    /// Topology file to load instead of `stratum.toml`.
    #[arg(long = "config", short = 'c', value_name = "PATH", global = true)]
    pub config_path: Option<Utf8PathBuf>,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub globals: GlobalArgs,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Global options. Settings fields here override file and environment values.
#[derive(Debug, Default, Clone, Args, Serialize)]
pub struct GlobalArgs {
    /// Release label recorded in completion markers.
    #[arg(long, value_name = "LABEL", global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,

    /// Directory holding per-layer state files.
    #[arg(long, value_name = "DIR", global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_root: Option<Utf8PathBuf>,

    /// Directory used by the local provisioning backend.
    #[arg(long, value_name = "DIR", global = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_root: Option<Utf8PathBuf>,

    /// Log filter directive, for example `debug` or `stratum=trace`.
    #[arg(long, value_name = "FILTER", global = true)]
    #[serde(skip)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    #[serde(skip)]
    pub format: OutputFormat,
}

/// How command results are written to standard output.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// JSON documents for pipelines.
    Json,
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute the plan for a layer without changing anything.
    Plan(PlanArgs),
    /// Apply a layer; without `--confirm` this only shows the plan.
    Apply(ApplyArgs),
    /// Print an output exposed by a completed layer.
    DescribeOutput(DescribeOutputArgs),
    /// Show the state of every layer.
    Status,
}

/// Arguments for `plan`.
#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Layer to plan.
    pub layer: String,

    /// Skip describing tracked resources before diffing.
    #[arg(long)]
    pub no_refresh: bool,

    /// Also write the plan as JSON to this file.
    #[arg(long, value_name = "PATH")]
    pub out: Option<Utf8PathBuf>,
}

/// Arguments for `apply`.
#[derive(Debug, Clone, Args)]
pub struct ApplyArgs {
    /// Layer to apply.
    pub layer: String,

    /// Execute the plan instead of only showing it.
    #[arg(long)]
    pub confirm: bool,

    /// Skip describing tracked resources before diffing.
    #[arg(long)]
    pub no_refresh: bool,
}

/// Arguments for `describe-output`.
#[derive(Debug, Clone, Args)]
pub struct DescribeOutputArgs {
    /// Layer exposing the output.
    pub layer: String,

    /// Output name.
    pub name: String,
}
