//! Diagnostic logging to standard error.

use tracing_subscriber::EnvFilter;

use crate::error::{CliError, Result};

/// Environment variable holding the default log filter.
pub const LOG_ENV: &str = "STRATUM_LOG";

/// Build the filter from `--log-level`, then `STRATUM_LOG`, then `warn`.
///
/// # Errors
///
/// Returns [`CliError::LogFilter`] when an explicit directive is invalid.
pub fn filter(directive: Option<&str>) -> Result<EnvFilter> {
    match directive {
        Some(raw) => EnvFilter::try_new(raw).map_err(|err| CliError::LogFilter {
            directive: raw.to_owned(),
            message: err.to_string(),
        }),
        None => Ok(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))),
    }
}

/// Install the global subscriber.
///
/// A subscriber installed earlier in the process is left in place.
///
/// # Errors
///
/// Returns [`CliError::LogFilter`] when an explicit directive is invalid.
pub fn init(directive: Option<&str>) -> Result<()> {
    let env_filter = filter(directive)?;
    let _unused = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}
