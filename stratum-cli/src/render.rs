//! Text and JSON rendering of command results.
//!
//! Text output is meant for operators reviewing a plan; JSON output is a
//! stable document per command for pipelines.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;
use stratum::{ApplyPlan, ApplyReport, CompletionMarker, PlanSummary, ResolvedInput};

use crate::cli::OutputFormat;
use crate::error::{CliError, Result};

const STDOUT: &str = "standard output";

/// Plan document with its counts alongside.
#[derive(Serialize)]
struct PlanDocument<'a> {
    summary: PlanSummary,
    #[serde(flatten)]
    plan: &'a ApplyPlan,
}

/// One layer's line in `status`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayerStatus {
    /// Layer name.
    pub layer: String,
    /// Trust level label.
    pub trust: &'static str,
    /// Store location.
    pub location: String,
    /// Store version.
    pub version: u64,
    /// Number of tracked resources.
    pub resources: usize,
    /// Marker of the last successful apply.
    pub completed: Option<CompletionMarker>,
}

fn json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out).map_err(|err| CliError::io(STDOUT, err))
}

/// Write a plan for review.
///
/// # Errors
///
/// Returns [`CliError::Io`] or [`CliError::Encode`] when writing fails.
pub fn plan(out: &mut dyn Write, format: OutputFormat, plan: &ApplyPlan) -> Result<()> {
    match format {
        OutputFormat::Json => json(
            out,
            &PlanDocument {
                summary: plan.summary(),
                plan,
            },
        ),
        OutputFormat::Text => plan_text(out, plan).map_err(|err| CliError::io(STDOUT, err)),
    }
}

fn plan_text(out: &mut dyn Write, plan: &ApplyPlan) -> std::io::Result<()> {
    writeln!(
        out,
        "Plan for layer '{}' (state version {}):",
        plan.layer, plan.base_version
    )?;
    for input in &plan.inputs {
        writeln!(
            out,
            "  < {}.{} = {}",
            input.layer,
            input.output,
            inline(&input.value)
        )?;
    }
    for declaration in &plan.to_create {
        writeln!(out, "  + {} ({})", declaration.id, declaration.kind)?;
    }
    for update in &plan.to_update {
        writeln!(
            out,
            "  ~ {} ({}): {}",
            update.declaration.id,
            update.declaration.kind,
            update.changed.join(", ")
        )?;
    }
    for entry in &plan.to_delete {
        writeln!(out, "  - {} ({})", entry.declaration_id, entry.kind)?;
    }
    for id in &plan.to_forget {
        writeln!(out, "  ? {id} (already gone)")?;
    }
    if plan.is_empty() {
        writeln!(out, "No changes.")
    } else {
        writeln!(out, "{}", plan.summary())
    }
}

/// Write the result of a confirmed apply.
///
/// # Errors
///
/// Returns [`CliError::Io`] or [`CliError::Encode`] when writing fails.
pub fn report(out: &mut dyn Write, format: OutputFormat, report: &ApplyReport) -> Result<()> {
    match format {
        OutputFormat::Json => json(out, report),
        OutputFormat::Text => writeln!(
            out,
            "Applied layer '{}' (state version {}): {} created, {} updated, {} deleted.",
            report.layer,
            report.version,
            report.created.len(),
            report.updated.len(),
            report.deleted.len()
        )
        .map_err(|err| CliError::io(STDOUT, err)),
    }
}

/// Write a resolved output.
///
/// Text output prints strings bare so the value can be captured by a shell.
///
/// # Errors
///
/// Returns [`CliError::Io`] or [`CliError::Encode`] when writing fails.
pub fn output(out: &mut dyn Write, format: OutputFormat, resolved: &ResolvedInput) -> Result<()> {
    match format {
        OutputFormat::Json => json(out, resolved),
        OutputFormat::Text => {
            writeln!(out, "{}", inline(&resolved.value)).map_err(|err| CliError::io(STDOUT, err))
        }
    }
}

/// Write the status of every layer.
///
/// # Errors
///
/// Returns [`CliError::Io`] or [`CliError::Encode`] when writing fails.
pub fn status(out: &mut dyn Write, format: OutputFormat, layers: &[LayerStatus]) -> Result<()> {
    match format {
        OutputFormat::Json => json(out, layers),
        OutputFormat::Text => status_text(out, layers).map_err(|err| CliError::io(STDOUT, err)),
    }
}

fn status_text(out: &mut dyn Write, layers: &[LayerStatus]) -> std::io::Result<()> {
    if layers.is_empty() {
        return writeln!(out, "No layers configured.");
    }
    for layer in layers {
        let completed = layer.completed.as_ref().map_or_else(
            || "not applied".to_owned(),
            |marker| {
                format!(
                    "release {} at {}",
                    marker.version,
                    marker.completed_at.to_rfc3339()
                )
            },
        );
        writeln!(
            out,
            "{} [{}] {} v{}: {} resources, {}",
            layer.layer, layer.trust, layer.location, layer.version, layer.resources, completed
        )?;
    }
    Ok(())
}

fn inline(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
