//! `rstest-bdd` behaviour suite for layered applies.
//!
//! [`fixtures`] holds the scenario state, [`steps`] registers the step
//! implementations, and [`scenarios`] binds the feature files.

mod fixtures;
mod scenarios;
mod steps;
