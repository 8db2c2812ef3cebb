//! Scenario state shared by the layered apply steps.

use anyhow::{Result, anyhow};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use stratum::{ApplyOutcome, StratumResult};
use test_helpers::Sandbox;

/// Sandbox under test and the outcome of the last apply.
#[derive(Debug, Default, ScenarioState)]
pub struct FlowContext {
    pub sandbox: Slot<Sandbox>,
    pub outcome: Slot<StratumResult<ApplyOutcome>>,
}

impl FlowContext {
    /// Run `f` against the sandbox created by the `Given` step.
    pub fn with_sandbox<T>(&self, f: impl FnOnce(&Sandbox) -> T) -> Result<T> {
        self.sandbox
            .with_ref(f)
            .ok_or_else(|| anyhow!("no sandbox; start with 'a fresh sample sandbox'"))
    }

    /// Consume the outcome recorded by the last `When` step.
    pub fn take_outcome(&self) -> Result<StratumResult<ApplyOutcome>> {
        self.outcome
            .take()
            .ok_or_else(|| anyhow!("no apply has run yet"))
    }
}

/// Provides an empty context for each scenario.
#[fixture]
pub fn flow_context() -> FlowContext {
    FlowContext::default()
}
