//! Implementations of the subcommands.

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::{Dir, OpenOptions};
use std::io::Write;
use stratum::{ApplyOutcome, ApplyPlan, Confirmation, ResolvedInput};
use tracing::info;

use crate::cli::{ApplyArgs, DescribeOutputArgs, OutputFormat, PlanArgs};
use crate::console::Console;
use crate::error::{CliError, Result};
use crate::render::{self, LayerStatus};
use crate::workspace::Workspace;

/// Compute and print the plan for a layer.
///
/// # Errors
///
/// Returns planning failures and output errors.
pub fn plan(
    workspace: &Workspace,
    console: &mut dyn Console,
    format: OutputFormat,
    args: &PlanArgs,
) -> Result<()> {
    let mut run = workspace
        .orchestrator(&args.layer)?
        .with_refresh(!args.no_refresh);
    let computed = run.plan()?;
    if let Some(path) = &args.out {
        write_plan_file(path, &computed)?;
        info!(layer = %args.layer, path = %path, "plan written");
    }
    render::plan(console.out(), format, &computed)
}

/// Show the plan, then execute it when `--confirm` was given.
///
/// Without `--confirm` nothing is executed. With it, the gate must
/// authorise the layer in the detected execution context, and privileged
/// layers additionally require the operator to type the layer name. JSON
/// output carries only the apply report.
///
/// # Errors
///
/// Returns gate rejections, a declined confirmation, planning and apply
/// failures, and output errors.
pub fn apply(
    workspace: &Workspace,
    console: &mut dyn Console,
    format: OutputFormat,
    args: &ApplyArgs,
) -> Result<()> {
    let mut run = workspace
        .orchestrator(&args.layer)?
        .with_refresh(!args.no_refresh);
    if !args.confirm {
        let computed = run.plan()?;
        let outcome = run.apply(&computed, Confirmation::DryRun)?;
        if let ApplyOutcome::DryRun(reviewed) = outcome {
            render::plan(console.out(), format, &reviewed)?;
        }
        return Ok(());
    }

    let context = console.execution_context(&workspace.settings().ci_env_vars);
    let token = workspace.gate().authorize(&args.layer, context)?;
    let computed = run.plan()?;
    if format == OutputFormat::Text {
        render::plan(console.out(), format, &computed)?;
    }
    if computed.is_empty() {
        info!(layer = %args.layer, "nothing to apply; refreshing completion marker");
    }
    if run.layer().is_privileged() {
        confirm_privileged(console, &args.layer)?;
    }
    match run.apply(&computed, Confirmation::Confirmed(token))? {
        ApplyOutcome::Applied(report) => render::report(console.out(), format, &report),
        ApplyOutcome::DryRun(reviewed) => render::plan(console.out(), format, &reviewed),
    }
}

fn confirm_privileged(console: &mut dyn Console, layer: &str) -> Result<()> {
    let prompt = format!("Layer '{layer}' is privileged. Type the layer name to apply it: ");
    let answer = console
        .ask(&prompt)
        .map_err(|err| CliError::io("confirmation prompt", err))?;
    if answer.trim() == layer {
        Ok(())
    } else {
        Err(CliError::ConfirmationDeclined {
            layer: layer.to_owned(),
        })
    }
}

/// Print one output of a completed layer.
///
/// # Errors
///
/// Returns resolution failures and output errors.
pub fn describe_output(
    workspace: &Workspace,
    console: &mut dyn Console,
    format: OutputFormat,
    args: &DescribeOutputArgs,
) -> Result<()> {
    let value = workspace.resolver().describe_output(&args.layer, &args.name)?;
    let resolved = ResolvedInput {
        layer: args.layer.clone(),
        output: args.name.clone(),
        value,
    };
    render::output(console.out(), format, &resolved)
}

/// Print the state of every layer, upstream layers first.
///
/// # Errors
///
/// Returns store failures and output errors.
pub fn status(
    workspace: &Workspace,
    console: &mut dyn Console,
    format: OutputFormat,
) -> Result<()> {
    let mut rows = Vec::new();
    for layer in workspace.topology().apply_order() {
        let store = workspace.stores().get(&layer.name)?;
        let snapshot = store.load()?;
        rows.push(LayerStatus {
            layer: layer.name.clone(),
            trust: layer.trust.as_str(),
            location: store.location().to_owned(),
            version: snapshot.version,
            resources: snapshot.resources().count(),
            completed: snapshot.completion_marker(),
        });
    }
    render::status(console.out(), format, &rows)
}

fn write_plan_file(path: &Utf8Path, plan: &ApplyPlan) -> Result<()> {
    let io_err = |err: std::io::Error| CliError::io(path.as_str(), err);
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| io_err(std::io::Error::other("plan path has no file name")))?;
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(io_err)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(io_err)?;
    let mut file = dir
        .open_with(
            file_name,
            OpenOptions::new().write(true).create(true).truncate(true),
        )
        .map_err(io_err)?;
    let payload = serde_json::to_vec_pretty(plan)?;
    file.write_all(&payload).map_err(io_err)?;
    file.write_all(b"\n").map_err(io_err)
}
