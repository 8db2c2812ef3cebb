//! Layered settings for the command-line tool.
//!
//! Values are merged from lowest to highest precedence:
//!
//! 1. built-in defaults,
//! 2. the topology file (`stratum.toml` in the working directory, or the
//!    file named by `--config`),
//! 3. `STRATUM_`-prefixed environment variables,
//! 4. command-line flags.
//!
//! Relative directories are resolved against the directory holding the
//! topology file.

mod env;

use camino::{Utf8Path, Utf8PathBuf};
use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use stratum::{Layer, StratumResult, Topology};
use tracing::debug;

use crate::cli::GlobalArgs;
use crate::error::{CliError, Result};
use env::SettingsEnv;

/// File looked up in the working directory when `--config` is absent.
pub const CONFIG_FILE: &str = "stratum.toml";

/// Prefix of environment variables that override settings.
pub const ENV_PREFIX: &str = "STRATUM_";

/// Variables that mark a process as running under automation by default.
pub const DEFAULT_CI_ENV_VARS: [&str; 2] = ["CI", "GITHUB_ACTIONS"];

/// Fully merged settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Release label recorded in completion markers.
    pub release: String,
    /// Directory holding per-layer state files.
    pub state_root: Utf8PathBuf,
    /// Directory used by the local provisioning backend.
    pub backend_root: Utf8PathBuf,
    /// Environment variables whose presence forbids interactive-only runs.
    pub ci_env_vars: Vec<String>,
    /// Layers of the topology.
    pub layers: Vec<Layer>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            release: "unreleased".to_owned(),
            state_root: Utf8PathBuf::from(".stratum/state"),
            backend_root: Utf8PathBuf::from(".stratum/resources"),
            ci_env_vars: DEFAULT_CI_ENV_VARS.map(str::to_owned).to_vec(),
            layers: Vec::new(),
        }
    }
}

impl Settings {
    /// Merge every configuration layer.
    ///
    /// `config_path` replaces the default `stratum.toml` lookup and must
    /// exist. A missing default file is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::ConfigNotFound`] when `config_path` does not exist,
    /// or [`CliError::Configuration`] when the merged values do not describe
    /// valid settings.
    pub fn load(config_path: Option<&Utf8Path>, overrides: &GlobalArgs) -> Result<Self> {
        let path = match config_path {
            Some(path) if !path.is_file() => return Err(CliError::ConfigNotFound(path.to_owned())),
            Some(path) => path.to_owned(),
            None => Utf8PathBuf::from(CONFIG_FILE),
        };
        debug!(config = %path, exists = path.is_file(), "loading settings");
        let mut settings: Self = Self::figment(&path, overrides).extract()?;
        let base = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        settings.state_root = anchor(base, &settings.state_root);
        settings.backend_root = anchor(base, &settings.backend_root);
        Ok(settings)
    }

    /// Compose the provider chain without extracting it.
    #[must_use]
    pub fn figment(path: &Utf8Path, overrides: &GlobalArgs) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_std_path()))
            .merge(SettingsEnv::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
    }

    /// Validate the configured layers into a topology.
    ///
    /// # Errors
    ///
    /// Returns the first validation error reported by [`Topology::new`].
    pub fn topology(&self) -> StratumResult<Topology> {
        Topology::new(self.release.clone(), self.layers.clone())
    }
}

fn anchor(base: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() || base.as_str() == "." {
        path.to_owned()
    } else {
        base.join(path)
    }
}
