//! Test helpers shared across the `stratum` workspace.
//!
//! - [`env`]: guards for environment mutation.
//! - [`figment`]: jailed configuration tests.
//! - [`topology`]: the two-layer sample topology and an in-memory sandbox.

pub mod env;
pub mod figment;
pub mod topology;

pub use topology::{SAMPLE_CONFIG, SAMPLE_RELEASE, Sandbox};
