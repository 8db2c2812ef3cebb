//! Step definitions for layered apply scenarios.
//! Drive the in-memory sandbox and assert on state, gate and provider.
#![expect(
    clippy::shadow_reuse,
    reason = "rstest-bdd step macros rebind placeholders during expansion"
)]

use anyhow::{Result, anyhow, ensure};
use rstest_bdd_macros::{given, then, when};
use serde_json::Value;
use stratum::{
    ApplyOutcome, ExecutionContext, ProviderError, ProviderHandle, ScriptedFailure, StateReader,
    StratumError,
};
use test_helpers::Sandbox;

use crate::fixtures::FlowContext;

fn apply(flow_context: &FlowContext, layer: &str, context: ExecutionContext) -> Result<()> {
    let outcome = flow_context.with_sandbox(|sandbox| sandbox.apply(layer, context))?;
    flow_context.outcome.set(outcome);
    Ok(())
}

#[given("a fresh sample sandbox")]
fn fresh_sandbox(flow_context: &FlowContext) -> Result<()> {
    flow_context.sandbox.set(Sandbox::new()?);
    flow_context.outcome.clear();
    Ok(())
}

#[given("the provider rejects declaration {id}")]
fn provider_rejects(flow_context: &FlowContext, id: String) -> Result<()> {
    flow_context.with_sandbox(|sandbox| {
        sandbox
            .backend
            .fail_on(id, ScriptedFailure::Reject("quota exceeded".to_owned()));
    })
}

#[given("the provider accepts every declaration")]
fn provider_accepts(flow_context: &FlowContext) -> Result<()> {
    flow_context.with_sandbox(|sandbox| sandbox.backend.clear_failures())
}

#[when("an operator applies the {layer} layer")]
#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd step macros require owned capture values"
)]
fn operator_applies(flow_context: &FlowContext, layer: String) -> Result<()> {
    apply(flow_context, &layer, ExecutionContext::interactive())
}

#[when("automation applies the {layer} layer")]
#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd step macros require owned capture values"
)]
fn automation_applies(flow_context: &FlowContext, layer: String) -> Result<()> {
    apply(flow_context, &layer, ExecutionContext::non_interactive())
}

#[then("the apply succeeds")]
fn apply_succeeds(flow_context: &FlowContext) -> Result<()> {
    match flow_context.take_outcome()? {
        Ok(ApplyOutcome::Applied(_)) => Ok(()),
        Ok(ApplyOutcome::DryRun(_)) => Err(anyhow!("apply returned a dry run")),
        Err(err) => Err(anyhow!("apply failed: {err}")),
    }
}

#[then("the apply is refused until {upstream} completes")]
#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd step macros require owned capture values"
)]
fn refused_until_upstream(flow_context: &FlowContext, upstream: String) -> Result<()> {
    let outcome = flow_context.take_outcome()?;
    ensure!(
        matches!(
            &outcome,
            Err(StratumError::UpstreamIncomplete { upstream: pending, .. }) if *pending == upstream
        ),
        "unexpected outcome: {outcome:?}"
    );
    Ok(())
}

#[then("the apply is refused without an operator")]
fn refused_without_operator(flow_context: &FlowContext) -> Result<()> {
    let outcome = flow_context.take_outcome()?;
    ensure!(
        matches!(
            &outcome,
            Err(StratumError::InteractiveConfirmationRequired { .. })
        ),
        "unexpected outcome: {outcome:?}"
    );
    Ok(())
}

#[then("the apply stops after {count:usize} operations with {failed} failed")]
#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd step macros require owned capture values"
)]
fn apply_stops(flow_context: &FlowContext, count: usize, failed: String) -> Result<()> {
    let err = match flow_context.take_outcome()? {
        Ok(outcome) => return Err(anyhow!("apply should have failed: {outcome:?}")),
        Err(err) => err,
    };
    let failure = err
        .as_partial_apply()
        .ok_or_else(|| anyhow!("expected a partial apply, got {err}"))?;
    ensure!(failure.completed.len() == count, "completed: {:?}", failure.completed);
    ensure!(failure.failed == failed, "failed: {}", failure.failed);
    ensure!(
        matches!(failure.cause, ProviderError::Rejected { .. }),
        "cause: {}",
        failure.cause
    );
    ensure!(failure.persisted_version.is_some(), "progress was not persisted");
    Ok(())
}

#[then("no provider operation was issued")]
fn no_provider_operation(flow_context: &FlowContext) -> Result<()> {
    let mutations = flow_context.with_sandbox(|sandbox| sandbox.backend.mutation_count())?;
    ensure!(mutations == 0, "{mutations} provider operations were issued");
    Ok(())
}

#[then("the {layer} layer records release {release}")]
#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd step macros require owned capture values"
)]
fn records_release(flow_context: &FlowContext, layer: String, release: String) -> Result<()> {
    let snapshot = flow_context.with_sandbox(|sandbox| sandbox.stores.get(&layer)?.load())??;
    let marker = snapshot
        .completion_marker()
        .ok_or_else(|| anyhow!("{layer} has no completion marker"))?;
    ensure!(marker.version == release, "recorded release {}", marker.version);
    Ok(())
}

#[then("the {layer} layer has no completion marker")]
#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd step macros require owned capture values"
)]
fn no_completion_marker(flow_context: &FlowContext, layer: String) -> Result<()> {
    let snapshot = flow_context.with_sandbox(|sandbox| sandbox.stores.get(&layer)?.load())??;
    ensure!(
        snapshot.completion_marker().is_none(),
        "{layer} unexpectedly completed"
    );
    Ok(())
}

#[then("the {layer} layer tracks {count:usize} resources")]
#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd step macros require owned capture values"
)]
fn tracks_resources(flow_context: &FlowContext, layer: String, count: usize) -> Result<()> {
    let snapshot = flow_context.with_sandbox(|sandbox| sandbox.stores.get(&layer)?.load())??;
    let tracked = snapshot.resources().count();
    ensure!(tracked == count, "{layer} tracks {tracked} resources");
    Ok(())
}

#[then("the provider resource {handle} has {key} {value}")]
#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd step macros require owned capture values"
)]
fn provider_resource_has(
    flow_context: &FlowContext,
    handle: String,
    key: String,
    value: String,
) -> Result<()> {
    let attributes = flow_context
        .with_sandbox(|sandbox| sandbox.backend.resource(&ProviderHandle::new(handle.as_str())))?
        .ok_or_else(|| anyhow!("{handle} was not provisioned"))?;
    let actual = attributes.get(&key);
    ensure!(
        actual == Some(&Value::String(value)),
        "{key} on {handle} is {actual:?}"
    );
    Ok(())
}

#[then("planning the {layer} layer again yields no changes")]
#[expect(
    clippy::needless_pass_by_value,
    reason = "rstest-bdd step macros require owned capture values"
)]
fn replan_is_empty(flow_context: &FlowContext, layer: String) -> Result<()> {
    let plan = flow_context.with_sandbox(|sandbox| sandbox.plan(&layer))??;
    ensure!(plan.is_empty(), "unexpected changes: {}", plan.summary());
    Ok(())
}
