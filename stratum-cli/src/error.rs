//! Error types for the `stratum` command.
//!
//! Every failure maps to one of a small set of process exit codes so
//! pipelines can tell an authorisation refusal from a broken topology.

use std::process::ExitCode;

use camino::Utf8PathBuf;
use stratum::{ErrorClass, ProviderError, StratumError};
use thiserror::Error;

/// Exit code for a failed plan or apply.
pub const EXIT_FAILURE: u8 = 1;
/// Exit code when the gate or the operator refused the run.
pub const EXIT_UNAUTHORISED: u8 = 2;
/// Exit code for unreadable or invalid configuration.
pub const EXIT_CONFIGURATION: u8 = 3;

/// Errors raised by the command-line tool.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CliError {
    /// Configuration layers could not be merged or extracted.
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Box<figment::Error>),

    /// An explicitly requested configuration file does not exist.
    #[error("configuration file '{0}' does not exist")]
    ConfigNotFound(Utf8PathBuf),

    /// The log filter directive could not be parsed.
    #[error("invalid log filter '{directive}': {message}")]
    LogFilter {
        /// Directive that was supplied.
        directive: String,
        /// Parser message.
        message: String,
    },

    /// Planning, applying or resolving failed.
    #[error(transparent)]
    Stratum(#[from] StratumError),

    /// The local provisioning backend could not be opened.
    #[error("failed to open provisioning backend: {0}")]
    Backend(#[from] ProviderError),

    /// The operator did not confirm a privileged apply.
    #[error("apply of layer '{layer}' was not confirmed")]
    ConfirmationDeclined {
        /// Layer awaiting confirmation.
        layer: String,
    },

    /// Writing output failed.
    #[error("failed to write {target}: {source}")]
    Io {
        /// What was being written.
        target: String,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Serialising a JSON document failed.
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CliError {
    /// Wrap an I/O failure while writing to `target`.
    #[must_use]
    pub fn io(target: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            target: target.into(),
            source,
        }
    }

    /// Returns the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) | Self::ConfigNotFound(_) | Self::LogFilter { .. } => {
                EXIT_CONFIGURATION
            }
            Self::ConfirmationDeclined { .. } => EXIT_UNAUTHORISED,
            Self::Stratum(err) => match err.class() {
                ErrorClass::Authorization => EXIT_UNAUTHORISED,
                ErrorClass::Configuration => EXIT_CONFIGURATION,
                _ => EXIT_FAILURE,
            },
            Self::Backend(_) | Self::Io { .. } | Self::Encode(_) => EXIT_FAILURE,
        }
    }
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(Box::new(err))
    }
}

impl From<&CliError> for ExitCode {
    fn from(err: &CliError) -> Self {
        Self::from(err.exit_code())
    }
}

/// Result alias for command-line operations.
pub type Result<T> = std::result::Result<T, CliError>;
