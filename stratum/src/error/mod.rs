//! Error types produced while planning, applying and authorising layers.

mod class;
mod constructors;
mod types;

pub use class::ErrorClass;
pub use types::{PartialApplyFailure, StratumError};

/// Result alias used throughout the crate.
pub type StratumResult<T> = Result<T, StratumError>;
