//! Binds the layered apply feature file to the step registry.

use crate::fixtures::{FlowContext, flow_context};
use rstest_bdd_macros::scenarios;

scenarios!(
    "tests/features/layered_apply.feature",
    fixtures = [flow_context: FlowContext]
);
